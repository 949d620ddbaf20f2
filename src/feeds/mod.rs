pub mod exchange;
pub mod paper;
pub mod quotes;
pub mod venue;
