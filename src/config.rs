//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name under which credentials are stored.
pub const KEYRING_SERVICE: &str = "ops-bot";

/// Nested Slack configuration for Socket Mode connectivity.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// never from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// Channel where start-up notices are posted. Empty disables them.
    #[serde(default)]
    pub channel_id: String,
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

fn default_heroku_cli() -> String {
    "heroku".into()
}

/// Global configuration parsed from `ops-bot.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Heroku application every command targets (`-a <app_name>`).
    #[serde(default)]
    pub app_name: String,
    /// Heroku CLI binary to spawn.
    #[serde(default = "default_heroku_cli")]
    pub heroku_cli: String,
    /// Chat user IDs allowed to run privileged commands.
    #[serde(default)]
    pub authorized_user_ids: Vec<String>,
    /// Config vars operators may change with `config KEY VALUE`.
    #[serde(default)]
    pub settable_config_vars: Vec<String>,
    /// Slack connectivity settings.
    #[serde(default)]
    pub slack: SlackConfig,
    /// Heroku API key handed to the CLI (populated at runtime, optional).
    #[serde(skip)]
    pub heroku_api_key: Option<String>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string, apply environment
    /// overrides, and validate the result.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `APP_NAME` and `AUTHORIZED_USERS` from the environment.
    ///
    /// `APP_NAME` replaces the configured application. `AUTHORIZED_USERS`
    /// is a comma-separated list merged into `authorized_user_ids`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(app_name) = env::var("APP_NAME") {
            if !app_name.trim().is_empty() {
                self.app_name = app_name.trim().to_owned();
            }
        }

        if let Ok(users) = env::var("AUTHORIZED_USERS") {
            for user in parse_user_list(&users) {
                if !self.authorized_user_ids.contains(&user) {
                    self.authorized_user_ids.push(user);
                }
            }
        }
    }

    /// Load Slack credentials and the optional Heroku API key from the OS
    /// keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars provide
    /// the Slack tokens.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        self.load_heroku_api_key().await;
        Ok(())
    }

    /// Load the Heroku API key if one is available.
    ///
    /// The CLI falls back to its own login session when no key is set.
    pub async fn load_heroku_api_key(&mut self) {
        match load_credential("heroku_api_key", "HEROKU_API_KEY").await {
            Ok(key) => self.heroku_api_key = Some(key),
            Err(err) => {
                warn!(%err, "no heroku api key configured, relying on cli login");
            }
        }
    }

    /// Whether a chat user is on the authorized list.
    #[must_use]
    pub fn is_authorized(&self, user_id: &str) -> bool {
        self.authorized_user_ids.iter().any(|id| id == user_id)
    }

    /// Validate that a chat user may run privileged commands.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if the user is not in the allowed list.
    pub fn ensure_authorized(&self, user_id: &str) -> Result<()> {
        if self.is_authorized(user_id) {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "user {user_id} is not authorized to run this command"
            )))
        }
    }

    /// Validate that a config var may be changed from chat.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if `key` is not listed in
    /// `settable_config_vars`.
    pub fn ensure_config_var_settable(&self, key: &str) -> Result<()> {
        if self.settable_config_vars.iter().any(|var| var == key) {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "config var {key} is not authorized to be updated from chat"
            )))
        }
    }

    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from("ops-bot.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(AppError::Config(
                "app_name must be set in the config file or APP_NAME".into(),
            ));
        }

        if self.heroku_cli.trim().is_empty() {
            return Err(AppError::Config("heroku_cli must not be empty".into()));
        }

        if self.authorized_user_ids.is_empty() {
            warn!("authorized_user_ids is empty; only public commands will run");
        }

        Ok(())
    }
}

/// Split a comma-separated user list, dropping blanks.
#[must_use]
pub fn parse_user_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
