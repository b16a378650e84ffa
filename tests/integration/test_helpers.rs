//! Shared fixtures: a recording message sink and a fake `heroku` CLI.

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Mutex;

use tempfile::TempDir;

use ops_bot::bot::relay::MessageSink;
use ops_bot::config::{GlobalConfig, SlackConfig};
use ops_bot::Result;

/// Sink that keeps every message in memory.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl MessageSink for RecordingSink {
    fn say(&self, text: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.messages.lock().unwrap().push(text);
            Ok(())
        })
    }
}

/// A temporary executable standing in for the Heroku CLI.
pub struct FakeCli {
    _dir: TempDir,
    pub path: PathBuf,
}

/// Write `body` as a `/bin/sh` script and make it executable.
pub fn fake_cli(body: &str) -> FakeCli {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("heroku");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    FakeCli { _dir: dir, path }
}

/// Configuration pointing at `cli`.
pub fn config_for(cli: &FakeCli) -> GlobalConfig {
    GlobalConfig {
        app_name: "crates-io".into(),
        heroku_cli: cli.path.to_string_lossy().into_owned(),
        authorized_user_ids: vec!["U100".into()],
        settable_config_vars: vec!["MAINTENANCE_MESSAGE".into()],
        slack: SlackConfig::default(),
        heroku_api_key: None,
    }
}
