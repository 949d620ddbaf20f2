pub mod candle;
pub mod content;
pub mod history;
pub mod opportunity;
pub mod order;
pub mod position;
pub mod quote;
pub mod signal;
