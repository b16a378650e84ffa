#![forbid(unsafe_code)]

//! `ops-bot` chat-ops relay binary.
//!
//! `serve` listens for Slack slash commands and streams command output back
//! into the channel. `run` executes a single command locally and prints its
//! output to stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use slack_morphism::prelude::SlackChannelId;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use ops_bot::bot::commands::OpsCommand;
use ops_bot::bot::console::ConsoleSink;
use ops_bot::bot::relay::{execute, Invoker};
use ops_bot::config::GlobalConfig;
use ops_bot::slack::client::{SlackMessage, SlackRuntime, SlackService};
use ops_bot::slack::BotState;
use ops_bot::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "ops-bot", about = "Chat-ops relay for the Heroku CLI", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value_os_t = GlobalConfig::default_path())]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Listen for Slack slash commands until interrupted.
    Serve,
    /// Run one command locally and print its output.
    Run {
        /// Command text, e.g. `restart` or `scale web=2`.
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!(app = %config.app_name, "configuration loaded");

    match args.action {
        Action::Serve => serve(config).await.map(|()| ExitCode::SUCCESS),
        Action::Run { command } => run_local(config, &command.join(" ")).await,
    }
}

/// Execute one command in the terminal. Local operators are trusted, so no
/// authorization check applies.
async fn run_local(mut config: GlobalConfig, text: &str) -> Result<ExitCode> {
    let command: OpsCommand = text.parse()?;
    config.load_heroku_api_key().await;

    let invoker = Invoker {
        user_id: std::env::var("USER").unwrap_or_else(|_| "local".into()),
    };
    let report = execute(&command, &invoker, &config, &ConsoleSink::new()).await?;

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn serve(mut config: GlobalConfig) -> Result<()> {
    config.load_credentials().await?;
    let config = Arc::new(config);

    let (slack, queue_task) = SlackService::start(&config.slack).map_err(|err| {
        error!(%err, "slack service start failed");
        err
    })?;
    let slack = Arc::new(slack);

    let state = Arc::new(BotState {
        config: Arc::clone(&config),
        slack: Arc::clone(&slack),
    });
    let runtime = SlackRuntime {
        queue_task,
        socket_task: slack.listen(&config.slack.app_token, state),
    };

    if !config.slack.channel_id.is_empty() {
        let notice = SlackMessage::plain(
            SlackChannelId(config.slack.channel_id.clone()),
            format!("ops-bot is connected and managing `{}`", config.app_name),
        );
        if let Err(err) = slack.enqueue(notice).await {
            error!(%err, "failed to post startup notice");
        }
    }

    info!("ops-bot ready");
    shutdown_signal().await;
    info!("shutdown signal received");

    runtime.socket_task.abort();
    runtime.queue_task.abort();
    info!("ops-bot shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so `ops-bot run` output stays clean on stdout.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
