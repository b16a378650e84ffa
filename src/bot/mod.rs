//! Operator-facing command handling, independent of the chat transport.
//!
//! - `blocklist`: edits the app's blocked address list.
//! - `commands`: parses command text into [`OpsCommand`](commands::OpsCommand).
//! - `relay`: runs a command and forwards its output to a
//!   [`MessageSink`](relay::MessageSink).
//! - `console`: a sink that prints to stdout, used by `ops-bot run`.

pub mod blocklist;
pub mod commands;
pub mod console;
pub mod relay;
