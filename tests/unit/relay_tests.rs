//! Unit tests for forwarding merged lines to a message sink.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use futures_util::stream::{self, StreamExt};

use ops_bot::bot::commands::{help_text, OpsCommand};
use ops_bot::bot::relay::{
    execute, relay_lines, relay_process, CommandReport, Invoker, MessageSink,
};
use ops_bot::config::GlobalConfig;
use ops_bot::stream::{LineStream, StreamMerger};
use ops_bot::{AppError, Result};

/// Records every message; fails once `fail_after` messages were accepted.
#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
    fail_after: Option<usize>,
}

impl RecordingSink {
    fn failing_after(n: usize) -> Self {
        Self {
            messages: Mutex::default(),
            fail_after: Some(n),
        }
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl MessageSink for RecordingSink {
    fn say(&self, text: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut messages = self.messages.lock().unwrap();
            if self.fail_after.is_some_and(|n| messages.len() >= n) {
                return Err(AppError::Slack("channel not found".into()));
            }
            messages.push(text);
            Ok(())
        })
    }
}

fn source(items: Vec<Result<String>>) -> LineStream {
    stream::iter(items).boxed()
}

fn lines(items: &[&str]) -> LineStream {
    source(items.iter().map(|s| Ok((*s).to_owned())).collect())
}

fn config() -> GlobalConfig {
    GlobalConfig {
        app_name: "crates-io".into(),
        heroku_cli: "heroku".into(),
        authorized_user_ids: vec!["U100".into()],
        settable_config_vars: vec!["MAINTENANCE_MESSAGE".into()],
        slack: ops_bot::config::SlackConfig::default(),
        heroku_api_key: None,
    }
}

#[tokio::test]
async fn every_line_becomes_one_message() {
    let sink = RecordingSink::default();
    let mut merged = StreamMerger::new(vec![lines(&["line1", "line2"]), lines(&["errline1"])]);

    let forwarded = relay_lines(&mut merged, &sink).await.expect("relay");

    assert_eq!(forwarded, 3);
    let mut messages = sink.messages();
    messages.sort();
    assert_eq!(messages, ["errline1", "line1", "line2"]);
}

#[tokio::test]
async fn empty_lines_are_not_sent() {
    let sink = RecordingSink::default();
    let mut merged = StreamMerger::new(vec![lines(&["", "text", ""])]);

    let forwarded = relay_lines(&mut merged, &sink).await.expect("relay");

    assert_eq!(forwarded, 1);
    assert_eq!(sink.messages(), ["text"]);
}

#[tokio::test]
async fn stream_failure_is_returned_as_stream_error() {
    let sink = RecordingSink::default();
    let mut merged = StreamMerger::new(vec![source(vec![
        Ok("before".into()),
        Err(AppError::Stream("pipe closed".into())),
    ])]);

    let result = relay_lines(&mut merged, &sink).await;

    assert!(matches!(result, Err(AppError::Stream(ref msg)) if msg == "pipe closed"));
    assert_eq!(sink.messages(), ["before"]);
}

#[tokio::test]
async fn sink_failure_closes_remaining_sources() {
    let sink = RecordingSink::failing_after(1);
    let mut merged = StreamMerger::new(vec![lines(&["a", "b", "c"]), lines(&["x", "y"])]);

    let result = relay_lines(&mut merged, &sink).await;

    assert!(matches!(result, Err(AppError::Slack(_))));
    assert_eq!(merged.active_sources(), 0);
    assert!(merged.next().await.is_none());
}

#[tokio::test]
async fn ping_replies_pong_without_spawning() {
    let sink = RecordingSink::default();
    let invoker = Invoker {
        user_id: "U555".into(),
    };

    let report = execute(&OpsCommand::Ping, &invoker, &config(), &sink)
        .await
        .expect("ping");

    assert!(report.success);
    assert_eq!(report.exit_code, None);
    assert_eq!(sink.messages(), ["pong"]);
}

#[tokio::test]
async fn myid_replies_with_the_caller_id() {
    let sink = RecordingSink::default();
    let invoker = Invoker {
        user_id: "U555".into(),
    };

    execute(&OpsCommand::MyId, &invoker, &config(), &sink)
        .await
        .expect("myid");

    assert_eq!(sink.messages(), ["Here is your user id U555"]);
}

#[tokio::test]
async fn missing_cli_binary_is_a_spawn_error() {
    let sink = RecordingSink::default();
    let mut config = config();
    config.heroku_cli = "/nonexistent/ops-bot-heroku".into();
    let invoker = Invoker {
        user_id: "U100".into(),
    };

    let result = execute(&OpsCommand::Restart, &invoker, &config, &sink).await;

    match result {
        Err(AppError::Spawn(msg)) => {
            assert!(msg.contains("/nonexistent/ops-bot-heroku restart -a crates-io"), "got: {msg}");
        }
        other => panic!("expected spawn error, got: {other:?}"),
    }
    assert!(sink.messages().is_empty());
}

#[cfg(unix)]
fn exited(code: i32) -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(code << 8)
}

#[cfg(unix)]
#[tokio::test]
async fn stream_failure_is_reported_even_when_the_process_exits_cleanly() {
    let sink = RecordingSink::default();
    let mut merged = StreamMerger::new(vec![source(vec![
        Ok("Restarting dynos".into()),
        Err(AppError::Stream("pipe closed".into())),
    ])]);

    let report = relay_process(&mut merged, async { Ok::<_, AppError>(exited(0)) }, &sink)
        .await
        .expect("relay");

    assert_eq!(
        sink.messages(),
        [
            "Restarting dynos",
            "Error reading command output: pipe closed",
            "Command complete",
        ]
    );
    assert_eq!(
        report,
        CommandReport {
            lines_forwarded: 1,
            exit_code: Some(0),
            success: false,
            stream_error: Some("pipe closed".into()),
        }
    );
}

#[cfg(unix)]
#[tokio::test]
async fn clean_output_with_failed_exit_reports_the_code() {
    let sink = RecordingSink::default();
    let mut merged = StreamMerger::new(vec![lines(&["partial"]), lines(&[" !    boom"])]);

    let report = relay_process(&mut merged, async { Ok::<_, AppError>(exited(3)) }, &sink)
        .await
        .expect("relay");

    assert_eq!(
        sink.messages().last().map(String::as_str),
        Some("Command failed (exit code 3)")
    );
    assert_eq!(report.lines_forwarded, 2);
    assert_eq!(report.exit_code, Some(3));
    assert_eq!(report.stream_error, None);
    assert!(!report.success);
}

#[cfg(unix)]
#[tokio::test]
async fn signal_termination_has_no_exit_code() {
    use std::os::unix::process::ExitStatusExt;

    let sink = RecordingSink::default();
    let mut merged = StreamMerger::new(vec![lines(&[])]);
    let killed = std::process::ExitStatus::from_raw(9);

    let report = relay_process(&mut merged, async move { Ok::<_, AppError>(killed) }, &sink)
        .await
        .expect("relay");

    assert_eq!(sink.messages(), ["Command failed (terminated by signal)"]);
    assert_eq!(report.exit_code, None);
    assert!(!report.success);
}

#[tokio::test]
async fn wait_failure_is_returned_after_output_is_relayed() {
    let sink = RecordingSink::default();
    let mut merged = StreamMerger::new(vec![lines(&["line"])]);

    let result = relay_process(
        &mut merged,
        async { Err::<std::process::ExitStatus, _>(AppError::Spawn("failed to wait".into())) },
        &sink,
    )
    .await;

    assert!(matches!(result, Err(AppError::Spawn(_))));
    assert_eq!(sink.messages(), ["line"]);
}

#[tokio::test]
async fn help_replies_with_the_command_list() {
    let sink = RecordingSink::default();
    let invoker = Invoker {
        user_id: "U555".into(),
    };

    let report = execute(&OpsCommand::Help, &invoker, &config(), &sink)
        .await
        .expect("help");

    assert!(report.success);
    assert_eq!(sink.messages(), [help_text()]);
}

#[tokio::test]
async fn config_var_outside_the_allow_list_is_refused_without_spawning() {
    let sink = RecordingSink::default();
    let mut config = config();
    config.heroku_cli = "/nonexistent/ops-bot-heroku".into();
    let invoker = Invoker {
        user_id: "U100".into(),
    };
    let command = OpsCommand::ConfigSet {
        key: "DATABASE_URL".into(),
        value: "postgres://elsewhere".into(),
    };

    let report = execute(&command, &invoker, &config, &sink)
        .await
        .expect("refusal is reported, not raised");

    assert!(!report.success);
    assert_eq!(
        sink.messages(),
        ["Config var DATABASE_URL is not authorized to be updated from chat"]
    );
}
