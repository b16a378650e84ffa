//! Stdout message sink for running commands from a terminal.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::bot::relay::MessageSink;
use crate::{AppError, Result};

/// Writes each message as one line on stdout.
#[derive(Debug)]
pub struct ConsoleSink {
    out: Mutex<Stdout>,
}

impl ConsoleSink {
    /// Create a sink over the process's stdout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSink for ConsoleSink {
    fn say(&self, text: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut out = self.out.lock().await;
            out.write_all(text.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush()
                .await
                .map_err(|err| AppError::Io(format!("failed to flush stdout: {err}")))
        })
    }
}
