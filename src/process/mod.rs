//! External command execution.
//!
//! - `command`: spawns the Heroku CLI with a scrubbed environment and exposes
//!   its merged output lines and exit status.

pub mod command;
