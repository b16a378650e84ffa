//! Blocked address list kept in the app's `BLOCKED_IPS` config var.
//!
//! The value is a comma-separated list. Edits read the current value with
//! `config:get`, then write it back with `config:set`, or `config:unset`
//! once the list becomes empty.

use std::collections::BTreeSet;
use std::net::IpAddr;

use tracing::info;

use crate::bot::commands::CliInvocation;
use crate::bot::relay::{CommandReport, MessageSink};
use crate::config::GlobalConfig;
use crate::process::command::{CapturedOutput, HerokuCommand};
use crate::Result;

/// Config var holding the blocked addresses.
pub const BLOCKED_IPS_VAR: &str = "BLOCKED_IPS";

/// Requested edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlocklistChange {
    /// Add an address.
    Block(IpAddr),
    /// Remove an address.
    Unblock(IpAddr),
}

/// What an edit does to the current list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlocklistPlan {
    /// The address is already on the list.
    AlreadyBlocked,
    /// The list is empty, so there is nothing to unblock.
    NothingBlocked,
    /// The address is not on a non-empty list.
    NotBlocked,
    /// Write this value back.
    Set(String),
    /// The last address was removed; drop the config var.
    Unset,
}

/// Split a `BLOCKED_IPS` value into its addresses, dropping blanks.
#[must_use]
pub fn parse_blocked_ips(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Decide how `change` applies to the `current` value.
#[must_use]
pub fn plan(current: &str, change: BlocklistChange) -> BlocklistPlan {
    let mut ips = parse_blocked_ips(current);
    match change {
        BlocklistChange::Block(ip) => {
            if ips.insert(ip.to_string()) {
                BlocklistPlan::Set(render(&ips))
            } else {
                BlocklistPlan::AlreadyBlocked
            }
        }
        BlocklistChange::Unblock(_) if ips.is_empty() => BlocklistPlan::NothingBlocked,
        BlocklistChange::Unblock(ip) => {
            if !ips.remove(&ip.to_string()) {
                return BlocklistPlan::NotBlocked;
            }
            if ips.is_empty() {
                BlocklistPlan::Unset
            } else {
                BlocklistPlan::Set(render(&ips))
            }
        }
    }
}

fn render(ips: &BTreeSet<String>) -> String {
    ips.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Apply `change` to the configured app and report the outcome to `sink`.
///
/// # Errors
///
/// Returns `AppError::Spawn` or `AppError::Stream` if a CLI call cannot be
/// run or read, or the sink's error if a message cannot be delivered.
pub async fn apply(
    change: BlocklistChange,
    config: &GlobalConfig,
    sink: &dyn MessageSink,
) -> Result<CommandReport> {
    let app = &config.app_name;
    let read = CliInvocation::for_app("config:get", vec![BLOCKED_IPS_VAR.to_owned()]);
    let current = HerokuCommand::run(config, &read)?.capture().await?;
    if !current.status.success() {
        return report_failure(&current, "read", sink).await;
    }

    let (ip, verb) = match change {
        BlocklistChange::Block(ip) => (ip, "blocked"),
        BlocklistChange::Unblock(ip) => (ip, "unblocked"),
    };
    let write = match plan(&current.stdout.join(","), change) {
        BlocklistPlan::AlreadyBlocked => {
            return report_unchanged(format!("{ip} is already blocked for {app}"), sink).await
        }
        BlocklistPlan::NothingBlocked => {
            return report_unchanged(
                format!("No IP addresses are currently blocked for {app}"),
                sink,
            )
            .await
        }
        BlocklistPlan::NotBlocked => {
            return report_unchanged(format!("{ip} is not currently blocked for {app}"), sink)
                .await
        }
        BlocklistPlan::Set(value) => {
            CliInvocation::for_app("config:set", vec![format!("{BLOCKED_IPS_VAR}={value}")])
        }
        BlocklistPlan::Unset => {
            CliInvocation::for_app("config:unset", vec![BLOCKED_IPS_VAR.to_owned()])
        }
    };

    let updated = HerokuCommand::run(config, &write)?.capture().await?;
    if !updated.status.success() {
        return report_failure(&updated, "update", sink).await;
    }

    info!(%ip, verb, app = %app, "blocklist updated");
    sink.say(format!("IP address {ip} has been {verb}")).await?;
    Ok(CommandReport {
        exit_code: updated.status.code(),
        success: true,
        ..CommandReport::default()
    })
}

async fn report_unchanged(text: String, sink: &dyn MessageSink) -> Result<CommandReport> {
    sink.say(text).await?;
    Ok(CommandReport {
        exit_code: Some(0),
        success: true,
        ..CommandReport::default()
    })
}

async fn report_failure(
    output: &CapturedOutput,
    step: &str,
    sink: &dyn MessageSink,
) -> Result<CommandReport> {
    let mut text = format!("Failed to {step} {BLOCKED_IPS_VAR}");
    for line in output.stderr.iter().filter(|line| !line.is_empty()) {
        text.push('\n');
        text.push_str(line);
    }
    sink.say(text).await?;
    Ok(CommandReport {
        exit_code: output.status.code(),
        success: false,
        ..CommandReport::default()
    })
}
