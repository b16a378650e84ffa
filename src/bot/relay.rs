//! Command execution and output relay.
//!
//! [`execute`] runs one [`OpsCommand`] and reports everything it prints to a
//! [`MessageSink`], one message per output line. A stream failure and a
//! non-zero exit are reported separately: either can happen without the
//! other.

use std::future::Future;
use std::pin::Pin;
use std::process::ExitStatus;

use futures_util::{Stream, StreamExt};
use tracing::{info, info_span, warn, Instrument};

use crate::bot::blocklist::{self, BlocklistChange};
use crate::bot::commands::{help_text, OpsCommand};
use crate::config::GlobalConfig;
use crate::process::command::HerokuCommand;
use crate::stream::StreamMerger;
use crate::{AppError, Result};

/// Destination for outbound chat messages.
pub trait MessageSink: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be delivered.
    fn say(&self, text: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Who issued a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    /// Chat user ID of the caller.
    pub user_id: String,
}

/// Outcome of one executed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReport {
    /// Output lines delivered to the sink.
    pub lines_forwarded: usize,
    /// Process exit code, when a process ran and exited normally.
    pub exit_code: Option<i32>,
    /// Whether the command succeeded.
    pub success: bool,
    /// Output stream failure, reported apart from the exit status.
    pub stream_error: Option<String>,
}

/// Forward every line of `lines` to `sink`, one message per line.
///
/// Empty lines are skipped since chat APIs reject empty messages. If the
/// sink fails, the remaining sources are closed before the error is
/// returned.
///
/// # Errors
///
/// Returns `AppError::Stream` if an output producer fails, or the sink's
/// error if delivery fails.
pub async fn relay_lines<S>(lines: &mut StreamMerger<S>, sink: &dyn MessageSink) -> Result<usize>
where
    S: Stream<Item = Result<String>> + Unpin,
{
    let mut forwarded = 0;
    forward_lines(lines, sink, &mut forwarded).await?;
    Ok(forwarded)
}

async fn forward_lines<S>(
    lines: &mut StreamMerger<S>,
    sink: &dyn MessageSink,
    forwarded: &mut usize,
) -> Result<()>
where
    S: Stream<Item = Result<String>> + Unpin,
{
    while let Some(line) = lines.next().await {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        if let Err(err) = sink.say(line).await {
            let released = lines.close();
            warn!(%err, released, "message delivery failed, abandoning output");
            return Err(err);
        }
        *forwarded += 1;
    }
    Ok(())
}

/// Report a running command's output and exit status to `sink`.
///
/// Every line of `lines` is forwarded, then `exit` is awaited. A stream
/// failure is announced on its own and marks the report unsuccessful even
/// when the process exits cleanly.
///
/// # Errors
///
/// Returns the error of `exit`, or the sink's error if a message cannot be
/// delivered.
pub async fn relay_process<S, W>(
    lines: &mut StreamMerger<S>,
    exit: W,
    sink: &dyn MessageSink,
) -> Result<CommandReport>
where
    S: Stream<Item = Result<String>> + Unpin,
    W: Future<Output = Result<ExitStatus>>,
{
    let mut lines_forwarded = 0;
    let stream_error = match forward_lines(lines, sink, &mut lines_forwarded).await {
        Ok(()) => None,
        Err(AppError::Stream(msg)) => {
            sink.say(format!("Error reading command output: {msg}"))
                .await?;
            Some(msg)
        }
        Err(err) => return Err(err),
    };

    let status = exit.await?;
    let exit_code = status.code();
    if status.success() {
        sink.say("Command complete".to_owned()).await?;
    } else {
        let detail = exit_code.map_or_else(
            || "terminated by signal".to_owned(),
            |code| format!("exit code {code}"),
        );
        sink.say(format!("Command failed ({detail})")).await?;
    }

    info!(
        lines_forwarded,
        ?exit_code,
        stream_failed = stream_error.is_some(),
        "command finished"
    );

    Ok(CommandReport {
        lines_forwarded,
        exit_code,
        success: status.success() && stream_error.is_none(),
        stream_error,
    })
}

/// Run `command` on behalf of `invoker` and report its output to `sink`.
///
/// Authorization is the caller's responsibility.
///
/// # Errors
///
/// Returns `AppError::Spawn` if the CLI cannot be started or awaited, or the
/// sink's error if a message cannot be delivered.
pub async fn execute(
    command: &OpsCommand,
    invoker: &Invoker,
    config: &GlobalConfig,
    sink: &dyn MessageSink,
) -> Result<CommandReport> {
    let span = info_span!("execute", command = %command, user = %invoker.user_id);

    async move {
        match command {
            OpsCommand::Ping => reply(sink, "pong".to_owned()).await,
            OpsCommand::MyId => {
                reply(sink, format!("Here is your user id {}", invoker.user_id)).await
            }
            OpsCommand::Help => reply(sink, help_text().to_owned()).await,
            OpsCommand::Block { ip } => {
                blocklist::apply(BlocklistChange::Block(*ip), config, sink).await
            }
            OpsCommand::Unblock { ip } => {
                blocklist::apply(BlocklistChange::Unblock(*ip), config, sink).await
            }
            OpsCommand::ConfigSet { key, .. } => match config.ensure_config_var_settable(key) {
                Ok(()) => run_cli(command, config, sink).await,
                Err(err) => {
                    warn!(%err, "rejected config var update");
                    sink.say(format!(
                        "Config var {key} is not authorized to be updated from chat"
                    ))
                    .await?;
                    Ok(CommandReport::default())
                }
            },
            _ => run_cli(command, config, sink).await,
        }
    }
    .instrument(span)
    .await
}

async fn reply(sink: &dyn MessageSink, text: String) -> Result<CommandReport> {
    sink.say(text).await?;
    Ok(CommandReport {
        success: true,
        ..CommandReport::default()
    })
}

async fn run_cli(
    command: &OpsCommand,
    config: &GlobalConfig,
    sink: &dyn MessageSink,
) -> Result<CommandReport> {
    let Some(invocation) = command.cli_invocation() else {
        return Err(AppError::Command(format!(
            "{command} does not map to a heroku command"
        )));
    };

    let mut process = HerokuCommand::run(config, &invocation)?;
    sink.say(format!("Running `{}`", process.command_line()))
        .await?;

    let mut lines = process.output_lines();
    relay_process(&mut lines, process.wait(), sink).await
}
