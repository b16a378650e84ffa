//! Heroku CLI process spawner.
//!
//! Spawns `heroku <subcommand> <args…> [-a <app>]` with:
//! - `kill_on_drop(true)` so an abandoned command does not linger.
//! - `env_clear()` + a safe variable allowlist so Slack tokens never reach
//!   the child's environment. The Heroku API key is injected explicitly
//!   when one was loaded.
//! - stdout and stderr piped, stdin closed.

use std::process::{ExitStatus, Stdio};

use futures_util::StreamExt;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::bot::commands::CliInvocation;
use crate::config::GlobalConfig;
use crate::stream::{line_stream, process_lines, ProcessLines};
use crate::{AppError, Result};

/// Environment variables inherited by the spawned CLI process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "TERM",
    "TMPDIR",
    "XDG_CACHE_HOME",
    "XDG_CONFIG_HOME",
    "XDG_DATA_HOME",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// A running Heroku CLI command.
#[derive(Debug)]
pub struct HerokuCommand {
    child: Child,
    command_line: String,
}

/// Everything a finished command printed, split by pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Lines written to stdout.
    pub stdout: Vec<String>,
    /// Lines written to stderr.
    pub stderr: Vec<String>,
    /// Exit status of the process.
    pub status: ExitStatus,
}

impl HerokuCommand {
    /// Spawn the CLI for `invocation`, targeting the configured application
    /// when the invocation is app-scoped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the process cannot be started.
    pub fn run(config: &GlobalConfig, invocation: &CliInvocation) -> Result<Self> {
        let mut cmd = Command::new(&config.heroku_cli);
        cmd.arg(invocation.subcommand).args(&invocation.args);
        if invocation.app_scoped {
            cmd.arg("-a").arg(&config.app_name);
        }

        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        if let Some(ref api_key) = config.heroku_api_key {
            cmd.env("HEROKU_API_KEY", api_key);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let command_line = display_invocation(config, invocation);
        let child = cmd
            .spawn()
            .map_err(|err| AppError::Spawn(format!("failed to spawn `{command_line}`: {err}")))?;

        info!(
            pid = child.id().unwrap_or(0),
            command = %command_line,
            "heroku command spawned"
        );

        Ok(Self {
            child,
            command_line,
        })
    }

    /// Human-readable form of the command line, e.g. `heroku restart -a app`.
    #[must_use]
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Take the child's stdout and stderr and merge them into one line
    /// stream.
    ///
    /// The pipes can only be taken once; later calls return a stream that
    /// ends immediately.
    pub fn output_lines(&mut self) -> ProcessLines {
        process_lines(self.child.stdout.take(), self.child.stderr.take())
    }

    /// Run to completion, keeping stdout and stderr apart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Stream` if either pipe fails while being read, or
    /// `AppError::Spawn` if the exit status cannot be collected.
    pub async fn capture(mut self) -> Result<CapturedOutput> {
        let stdout = line_stream(self.child.stdout.take()).collect::<Vec<_>>();
        let stderr = line_stream(self.child.stderr.take()).collect::<Vec<_>>();
        let (stdout, stderr) = tokio::join!(stdout, stderr);

        let stdout = stdout.into_iter().collect::<Result<Vec<_>>>()?;
        let stderr = stderr.into_iter().collect::<Result<Vec<_>>>()?;
        let status = self.wait().await?;

        Ok(CapturedOutput {
            stdout,
            stderr,
            status,
        })
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the exit status cannot be collected.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await.map_err(|err| {
            AppError::Spawn(format!("failed to wait for `{}`: {err}", self.command_line))
        })?;
        debug!(command = %self.command_line, ?status, "heroku command exited");
        Ok(status)
    }
}

/// Render the command line the way an operator would type it.
#[must_use]
pub fn display_invocation(config: &GlobalConfig, invocation: &CliInvocation) -> String {
    let mut parts = vec![config.heroku_cli.as_str(), invocation.subcommand];
    parts.extend(invocation.args.iter().map(String::as_str));
    if invocation.app_scoped {
        parts.extend(["-a", config.app_name.as_str()]);
    }
    parts.join(" ")
}
