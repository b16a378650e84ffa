//! Operator command parsing.
//!
//! Command text is split on single spaces. Public commands (`ping`, `myid`,
//! `help`) run for anyone; everything that drives the Heroku CLI requires
//! the caller to be on the authorized list.

use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::{AppError, Result};

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpsCommand {
    /// Liveness check; replies `pong`.
    Ping,
    /// Reply with the caller's chat user ID.
    MyId,
    /// List the available commands.
    Help,
    /// `heroku apps`.
    Apps,
    /// `heroku restart`.
    Restart,
    /// `heroku apps:info`.
    Info,
    /// `heroku releases`.
    Releases,
    /// `heroku rollback [version]`; without a version Heroku picks the
    /// previous release.
    Rollback {
        /// Target release such as `v42`.
        version: Option<String>,
    },
    /// `heroku ps:scale <formation>`.
    Scale {
        /// Formation such as `web=2` or `worker=1:standard-2x`.
        formation: String,
    },
    /// `heroku config:set KEY=VALUE` for an allow-listed key.
    ConfigSet {
        /// Config var name.
        key: String,
        /// New value.
        value: String,
    },
    /// Add an address to the app's `BLOCKED_IPS` config var.
    Block {
        /// Address to block.
        ip: IpAddr,
    },
    /// Remove an address from the app's `BLOCKED_IPS` config var.
    Unblock {
        /// Address to unblock.
        ip: IpAddr,
    },
}

/// A Heroku CLI subcommand with its arguments, excluding `-a <app>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliInvocation {
    /// Subcommand such as `restart` or `ps:scale`.
    pub subcommand: &'static str,
    /// Extra arguments following the subcommand.
    pub args: Vec<String>,
    /// Whether `-a <app>` is appended.
    pub app_scoped: bool,
}

impl CliInvocation {
    /// An invocation against the configured application.
    #[must_use]
    pub fn for_app(subcommand: &'static str, args: Vec<String>) -> Self {
        Self {
            subcommand,
            args,
            app_scoped: true,
        }
    }
}

impl OpsCommand {
    /// Whether the caller must be on the authorized list.
    #[must_use]
    pub fn requires_authorization(&self) -> bool {
        !matches!(self, Self::Ping | Self::MyId | Self::Help)
    }

    /// The single Heroku CLI call this command maps to, if any.
    ///
    /// Chat-only replies and the blocklist edits, which need more than one
    /// call, return `None`.
    #[must_use]
    pub fn cli_invocation(&self) -> Option<CliInvocation> {
        let invocation = match self {
            Self::Ping | Self::MyId | Self::Help | Self::Block { .. } | Self::Unblock { .. } => {
                return None
            }
            Self::Apps => CliInvocation {
                subcommand: "apps",
                args: Vec::new(),
                app_scoped: false,
            },
            Self::Restart => CliInvocation::for_app("restart", Vec::new()),
            Self::Info => CliInvocation::for_app("apps:info", Vec::new()),
            Self::Releases => CliInvocation::for_app("releases", Vec::new()),
            Self::Rollback { version } => {
                CliInvocation::for_app("rollback", version.iter().cloned().collect())
            }
            Self::Scale { formation } => CliInvocation::for_app("ps:scale", vec![formation.clone()]),
            Self::ConfigSet { key, value } => {
                CliInvocation::for_app("config:set", vec![format!("{key}={value}")])
            }
        };
        Some(invocation)
    }

    /// Command keyword as typed by the operator.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::MyId => "myid",
            Self::Help => "help",
            Self::Apps => "apps",
            Self::Restart => "restart",
            Self::Info => "info",
            Self::Releases => "releases",
            Self::Rollback { .. } => "rollback",
            Self::Scale { .. } => "scale",
            Self::ConfigSet { .. } => "config",
            Self::Block { .. } => "block",
            Self::Unblock { .. } => "unblock",
        }
    }
}

/// Reply for `help`.
#[must_use]
pub fn help_text() -> &'static str {
    "Available commands:\n\
     `ping` check the bot is alive\n\
     `myid` show your user id\n\
     `help` show this list\n\
     `apps` list Heroku apps\n\
     `info` show app details\n\
     `releases` list recent releases\n\
     `restart` restart all dynos\n\
     `rollback [vN]` roll back to a release\n\
     `scale TYPE=N[:SIZE]` scale a process type\n\
     `config KEY VALUE` set an allowed config var\n\
     `block IP` / `unblock IP` edit the blocked address list"
}

impl Display for OpsCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rollback {
                version: Some(version),
            } => write!(f, "rollback {version}"),
            Self::Scale { formation } => write!(f, "scale {formation}"),
            Self::ConfigSet { key, value } => write!(f, "config {key} {value}"),
            Self::Block { ip } => write!(f, "block {ip}"),
            Self::Unblock { ip } => write!(f, "unblock {ip}"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for OpsCommand {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let args = s.trim().split(' ').collect::<Vec<_>>();
        match args.as_slice() {
            ["ping"] => Ok(Self::Ping),
            ["myid"] => Ok(Self::MyId),
            ["help"] => Ok(Self::Help),
            ["apps"] => Ok(Self::Apps),
            ["restart"] => Ok(Self::Restart),
            ["info"] => Ok(Self::Info),
            ["releases"] => Ok(Self::Releases),
            [name @ ("ping" | "myid" | "help" | "apps" | "restart" | "info" | "releases"), ..] => {
                Err(AppError::Command(format!("{name} does not take arguments")))
            }
            ["rollback"] => Ok(Self::Rollback { version: None }),
            ["rollback", version] => parse_release_version(version).map(|version| {
                Self::Rollback {
                    version: Some(version),
                }
            }),
            ["rollback", ..] => Err(AppError::Command(
                "rollback takes at most one argument".into(),
            )),
            ["scale", formation] => {
                parse_formation(formation).map(|formation| Self::Scale { formation })
            }
            ["scale", ..] => Err(AppError::Command(
                "scale requires a formation like web=2".into(),
            )),
            ["config", key, value] if !value.is_empty() => {
                parse_config_key(key).map(|key| Self::ConfigSet {
                    key,
                    value: (*value).to_owned(),
                })
            }
            ["config", ..] => Err(AppError::Command(
                "config requires a key and a value".into(),
            )),
            ["block", ip] => parse_ip(ip).map(|ip| Self::Block { ip }),
            ["unblock", ip] => parse_ip(ip).map(|ip| Self::Unblock { ip }),
            [name @ ("block" | "unblock"), ..] => Err(AppError::Command(format!(
                "{name} requires one IP address"
            ))),
            _ => Err(AppError::Command(format!(
                "unrecognized command: {}",
                s.trim()
            ))),
        }
    }
}

fn release_version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^v?[0-9]+$").unwrap_or_else(|_| unreachable!()))
}

fn formation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_-]*=[0-9]+(:[A-Za-z0-9-]+)?$").unwrap_or_else(|_| unreachable!())
    })
}

fn config_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").unwrap_or_else(|_| unreachable!()))
}

/// Normalize a release version to the `vN` form Heroku expects.
fn parse_release_version(raw: &str) -> Result<String> {
    if !release_version_pattern().is_match(raw) {
        return Err(AppError::Command(format!(
            "invalid release version: {raw} (expected e.g. v42)"
        )));
    }
    Ok(if raw.starts_with('v') {
        raw.to_owned()
    } else {
        format!("v{raw}")
    })
}

fn parse_formation(raw: &str) -> Result<String> {
    if formation_pattern().is_match(raw) {
        Ok(raw.to_owned())
    } else {
        Err(AppError::Command(format!(
            "invalid formation: {raw} (expected e.g. web=2 or worker=1:standard-2x)"
        )))
    }
}

fn parse_config_key(raw: &str) -> Result<String> {
    if config_key_pattern().is_match(raw) {
        Ok(raw.to_owned())
    } else {
        Err(AppError::Command(format!(
            "invalid config var name: {raw} (expected e.g. MAINTENANCE_MESSAGE)"
        )))
    }
}

fn parse_ip(raw: &str) -> Result<IpAddr> {
    raw.parse()
        .map_err(|_| AppError::Command(format!("invalid IP address: {raw}")))
}
