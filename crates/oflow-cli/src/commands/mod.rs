//! Command handler modules for oflow-cli.

pub mod backtest;
pub mod md;
pub mod run;
