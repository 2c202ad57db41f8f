//! Infrastructure adapters for configuration and console input.

pub mod config;
pub mod prompt;
