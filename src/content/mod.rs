pub mod generator;
pub mod llm;
