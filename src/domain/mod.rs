//! Core domain types and the backtest pipeline.

pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod monthly;
pub mod position;
pub mod price_bar;
pub mod profit;
pub mod signal;
pub mod timeline;
pub mod trade;
