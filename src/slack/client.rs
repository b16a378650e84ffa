//! Slack Socket Mode client with a small buffered send queue.
//!
//! Output lines are posted through a single queue worker, so the order in
//! which they are enqueued is the order in which they appear in the channel.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use slack_morphism::prelude::{
    SlackApiChatPostMessageRequest, SlackApiToken, SlackApiTokenType, SlackApiTokenValue,
    SlackChannelId, SlackClient, SlackClientEventsListenerEnvironment,
    SlackClientHyperHttpsConnector, SlackClientSocketModeConfig, SlackClientSocketModeListener,
    SlackMessageContent, SlackSocketModeListenerCallbacks,
};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{error, info, warn};

use crate::bot::relay::MessageSink;
use crate::slack::{commands, BotState};
use crate::{config::SlackConfig, AppError, Result};

const QUEUE_CAPACITY: usize = 256;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 5;

/// Message to be delivered to Slack via chat.postMessage.
#[derive(Debug, Clone)]
pub struct SlackMessage {
    /// Target channel.
    pub channel: SlackChannelId,
    /// Plain message text.
    pub text: String,
}

impl SlackMessage {
    /// Create a plain-text message for a channel.
    #[must_use]
    pub fn plain(channel: SlackChannelId, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: text.into(),
        }
    }

    fn into_request(self) -> SlackApiChatPostMessageRequest {
        let content = SlackMessageContent {
            text: Some(self.text),
            blocks: None,
            attachments: None,
            upload: None,
            files: None,
            reactions: None,
            metadata: None,
            markdown_text: None,
        };

        SlackApiChatPostMessageRequest {
            channel: self.channel,
            content,
            as_user: None,
            icon_emoji: None,
            icon_url: None,
            link_names: Some(false),
            parse: None,
            thread_ts: None,
            username: None,
            reply_broadcast: None,
            unfurl_links: Some(false),
            unfurl_media: None,
        }
    }
}

/// Slack client wrapper that owns a rate-limited outgoing queue.
pub struct SlackService {
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    queue_tx: mpsc::Sender<SlackMessage>,
}

/// Join handles for Slack background tasks.
pub struct SlackRuntime {
    /// Outgoing message worker.
    pub queue_task: JoinHandle<()>,
    /// Socket Mode listener.
    pub socket_task: JoinHandle<()>,
}

impl SlackService {
    /// Create the Slack client and start the background sender task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the HTTPS connector cannot be created.
    pub fn start(config: &SlackConfig) -> Result<(Self, JoinHandle<()>)> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Slack(format!("failed to init slack connector: {err}")))?;
        let client = Arc::new(SlackClient::new(connector));
        let bot_token = token(&config.bot_token, SlackApiTokenType::Bot);

        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let queue_task = Self::spawn_worker(Arc::clone(&client), bot_token, queue_rx);

        info!("slack sender queue started");
        Ok((Self { client, queue_tx }, queue_task))
    }

    /// Enqueue a message for async delivery.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the sender task has stopped.
    pub async fn enqueue(&self, message: SlackMessage) -> Result<()> {
        self.queue_tx
            .send(message)
            .await
            .map_err(|err| AppError::Slack(format!("failed to enqueue slack message: {err}")))
    }

    /// Start the Socket Mode listener that receives slash commands.
    ///
    /// `state` is handed to every command callback through the listener's
    /// user state.
    #[must_use]
    pub fn listen(&self, app_token: &str, state: Arc<BotState>) -> JoinHandle<()> {
        let app_token = token(app_token, SlackApiTokenType::App);
        let listener_env = Arc::new(
            SlackClientEventsListenerEnvironment::new(Arc::clone(&self.client))
                .with_user_state(state),
        );
        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_hello_events(|event, _client, _state| async move {
                info!(?event, "socket hello");
            })
            .with_command_events(commands::handle_command);
        let config = SlackClientSocketModeConfig {
            max_connections_count: SlackClientSocketModeConfig::DEFAULT_CONNECTIONS_COUNT,
            debug_connections: SlackClientSocketModeConfig::DEFAULT_DEBUG_CONNECTIONS,
            initial_backoff_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_INITIAL_BACKOFF_IN_SECONDS,
            reconnect_timeout_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_RECONNECT_TIMEOUT_IN_SECONDS,
            ping_interval_in_seconds: SlackClientSocketModeConfig::DEFAULT_PING_INTERVAL_IN_SECONDS,
            ping_failure_threshold_times:
                SlackClientSocketModeConfig::DEFAULT_PING_FAILURE_THRESHOLD_TIMES,
        };

        let listener = SlackClientSocketModeListener::new(&config, listener_env, callbacks);
        tokio::spawn(async move {
            if let Err(error) = listener.listen_for(&app_token).await {
                error!(?error, "socket mode listen failed");
                return;
            }

            listener.serve().await;
            info!("socket mode listener exited");
        })
    }

    fn spawn_worker(
        client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
        token: SlackApiToken,
        mut queue_rx: mpsc::Receiver<SlackMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let session = client.open_session(&token);
            while let Some(message) = queue_rx.recv().await {
                let request = message.into_request();
                let mut backoff = INITIAL_RETRY_DELAY;
                let mut attempt = 1;
                loop {
                    match session.chat_post_message(&request).await {
                        Ok(_) => break,
                        Err(error) if attempt >= MAX_ATTEMPTS => {
                            error!(?error, attempt, "slack post failed; dropping message");
                            break;
                        }
                        Err(error) => {
                            let delay = match &error {
                                slack_morphism::errors::SlackClientError::RateLimitError(rate) => {
                                    rate.retry_after.unwrap_or(backoff)
                                }
                                _ => backoff,
                            };
                            warn!(?error, delay = ?delay, attempt, "slack post failed; retrying");
                            sleep(delay).await;
                            backoff = (backoff * 2).min(MAX_RETRY_DELAY);
                            attempt += 1;
                        }
                    }
                }
            }
            info!("slack sender task exiting");
        })
    }
}

fn token(value: &str, token_type: SlackApiTokenType) -> SlackApiToken {
    SlackApiToken {
        token_value: SlackApiTokenValue(value.to_owned()),
        cookie: None,
        team_id: None,
        scope: None,
        token_type: Some(token_type),
    }
}

/// Message sink that posts into one Slack channel.
pub struct SlackChannelSink {
    slack: Arc<SlackService>,
    channel: SlackChannelId,
}

impl SlackChannelSink {
    /// Create a sink posting to `channel`.
    #[must_use]
    pub fn new(slack: Arc<SlackService>, channel: SlackChannelId) -> Self {
        Self { slack, channel }
    }
}

impl MessageSink for SlackChannelSink {
    fn say(&self, text: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.slack
                .enqueue(SlackMessage::plain(self.channel.clone(), text))
                .await
        })
    }
}
