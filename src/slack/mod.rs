//! Slack bridge layer modules.

pub mod client;
pub mod commands;

use std::sync::Arc;

use crate::config::GlobalConfig;
use client::SlackService;

/// Shared state handed to Slack callbacks.
pub struct BotState {
    /// Validated configuration with credentials loaded.
    pub config: Arc<GlobalConfig>,
    /// Outgoing Slack queue.
    pub slack: Arc<SlackService>,
}
