//! Core domain types and the rolling-window engine.

pub mod price;
pub mod universe;
pub mod table;
pub mod window;
pub mod allocation;
pub mod returns;
pub mod compounder;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
