//! Slack slash command router.
//!
//! `/ops <command>` is parsed into an [`OpsCommand`], checked against the
//! authorized list, and run in a background task whose output is posted to
//! the channel the command came from. The slash command itself is answered
//! with an ephemeral acknowledgement right away.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackChannelId, SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackCommandEvent, SlackCommandEventResponse, SlackMessageContent, SlackMessageResponseType,
};
use tracing::{error, info, warn};

use crate::bot::commands::OpsCommand;
use crate::bot::relay::{execute, Invoker, MessageSink};
use crate::config::GlobalConfig;
use crate::slack::client::SlackChannelSink;
use crate::slack::BotState;

/// Handle incoming slash commands routed via Socket Mode.
///
/// # Errors
///
/// Returns an error if the command response cannot be constructed.
pub async fn handle_command(
    event: SlackCommandEvent,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::AnyStdResult<SlackCommandEventResponse> {
    let user_id = event.user_id.to_string();
    let text = event.text.unwrap_or_default();
    info!(command = ?event.command, user = %user_id, text = %text, "received slash command");

    let bot_state: Option<Arc<BotState>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<BotState>>().cloned()
    };
    let Some(bot_state) = bot_state else {
        warn!("bot state not available; cannot run command");
        return Ok(ephemeral("ops-bot is not ready yet"));
    };

    let reply = dispatch(&bot_state, &user_id, &text, event.channel_id);
    Ok(ephemeral(reply))
}

/// Parse and authorize command text from `user_id`.
///
/// # Errors
///
/// Returns the reply to show the caller when the text does not parse or the
/// caller may not run the command.
pub fn screen(config: &GlobalConfig, user_id: &str, text: &str) -> Result<OpsCommand, String> {
    let command: OpsCommand = text
        .parse()
        .map_err(|err| format!("Error running command: {err}"))?;

    if command.requires_authorization() {
        if let Err(err) = config.ensure_authorized(user_id) {
            warn!(%err, command = %command, "unauthorized command attempt");
            return Err(format!(
                "User <@{user_id}> is not authorized to run this command"
            ));
        }
    }

    Ok(command)
}

/// Screen and launch a command. Returns the acknowledgement text.
fn dispatch(state: &Arc<BotState>, user_id: &str, text: &str, channel: SlackChannelId) -> String {
    let command = match screen(&state.config, user_id, text) {
        Ok(command) => command,
        Err(reply) => return reply,
    };

    let ack = format!("Running `{command}`");
    let state = Arc::clone(state);
    let invoker = Invoker {
        user_id: user_id.to_owned(),
    };
    tokio::spawn(async move {
        let sink = SlackChannelSink::new(Arc::clone(&state.slack), channel);
        if let Err(err) = execute(&command, &invoker, &state.config, &sink).await {
            error!(%err, command = %command, "command execution failed");
            let notice = format!("There was an error when running {command}: {err}");
            if let Err(err) = sink.say(notice).await {
                error!(%err, "failed to report command error to slack");
            }
        }
    });

    ack
}

fn ephemeral(text: impl Into<String>) -> SlackCommandEventResponse {
    SlackCommandEventResponse {
        content: SlackMessageContent {
            text: Some(text.into()),
            blocks: None,
            attachments: None,
            upload: None,
            files: None,
            reactions: None,
            metadata: None,
            markdown_text: None,
        },
        response_type: Some(SlackMessageResponseType::Ephemeral),
    }
}
