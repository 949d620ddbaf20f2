pub mod alerts;
pub mod performance;
