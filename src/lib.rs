pub mod batch;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod format;
pub mod interrupt;
pub mod logging;
pub mod masking;
pub mod output;
pub mod saga;
pub mod sql;
pub mod tables;
