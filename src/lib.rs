//! Chat-ops bot that runs Heroku CLI commands and relays their output line by line.

#![forbid(unsafe_code)]

pub mod bot;
pub mod config;
pub mod errors;
pub mod process;
pub mod slack;
pub mod stream;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
