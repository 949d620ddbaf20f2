pub mod arbitrage;
pub mod executor;
