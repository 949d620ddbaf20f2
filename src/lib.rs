#![allow(dead_code)]

pub mod config;
pub mod content;
pub mod execution;
pub mod feeds;
pub mod models;
pub mod risk;
pub mod signals;
pub mod strategies;
pub mod telemetry;
