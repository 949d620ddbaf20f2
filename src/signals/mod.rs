pub mod arbitrage;
pub mod opportunities;
pub mod predictor;
pub mod scorer;
