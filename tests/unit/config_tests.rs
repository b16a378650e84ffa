//! Unit tests for configuration parsing, env overrides, and authorization.
//!
//! Parsing reads `APP_NAME` and `AUTHORIZED_USERS`, so every test that
//! parses runs serially with those variables controlled.

use serial_test::serial;

use ops_bot::config::{parse_user_list, GlobalConfig};
use ops_bot::AppError;

const SAMPLE: &str = r#"
app_name = "crates-io"
heroku_cli = "/usr/local/bin/heroku"
authorized_user_ids = ["U100", "U200"]
settable_config_vars = ["MAINTENANCE_MESSAGE"]

[slack]
channel_id = "C123"
"#;

fn clear_env() {
    std::env::remove_var("APP_NAME");
    std::env::remove_var("AUTHORIZED_USERS");
}

#[test]
#[serial]
fn parses_valid_config() {
    clear_env();
    let config = GlobalConfig::from_toml_str(SAMPLE).expect("config parses");

    assert_eq!(config.app_name, "crates-io");
    assert_eq!(config.heroku_cli, "/usr/local/bin/heroku");
    assert_eq!(config.authorized_user_ids, ["U100", "U200"]);
    assert_eq!(config.slack.channel_id, "C123");
    assert!(config.slack.bot_token.is_empty(), "tokens never come from toml");
    assert!(config.heroku_api_key.is_none());
}

#[test]
#[serial]
fn minimal_config_uses_defaults() {
    clear_env();
    let config = GlobalConfig::from_toml_str("app_name = \"staging\"").expect("parses");

    assert_eq!(config.heroku_cli, "heroku");
    assert!(config.authorized_user_ids.is_empty());
    assert!(config.slack.channel_id.is_empty());
}

#[test]
#[serial]
fn missing_app_name_is_rejected() {
    clear_env();
    match GlobalConfig::from_toml_str("") {
        Err(AppError::Config(msg)) => assert!(msg.contains("app_name"), "got: {msg}"),
        other => panic!("expected config error, got: {other:?}"),
    }
}

#[test]
#[serial]
fn empty_heroku_cli_is_rejected() {
    clear_env();
    let result = GlobalConfig::from_toml_str("app_name = \"x\"\nheroku_cli = \" \"");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
#[serial]
fn invalid_toml_is_a_config_error() {
    clear_env();
    match GlobalConfig::from_toml_str("app_name = [") {
        Err(AppError::Config(msg)) => assert!(msg.starts_with("invalid config")),
        other => panic!("expected config error, got: {other:?}"),
    }
}

#[test]
#[serial]
fn app_name_env_overrides_file() {
    clear_env();
    std::env::set_var("APP_NAME", "crates-io-staging");

    let config = GlobalConfig::from_toml_str(SAMPLE).expect("parses");
    clear_env();

    assert_eq!(config.app_name, "crates-io-staging");
}

#[test]
#[serial]
fn app_name_may_come_from_env_alone() {
    clear_env();
    std::env::set_var("APP_NAME", "from-env");

    let result = GlobalConfig::from_toml_str("");
    clear_env();

    assert_eq!(result.expect("parses").app_name, "from-env");
}

#[test]
#[serial]
fn authorized_users_env_is_merged_without_duplicates() {
    clear_env();
    std::env::set_var("AUTHORIZED_USERS", "U200, U300,,");

    let config = GlobalConfig::from_toml_str(SAMPLE).expect("parses");
    clear_env();

    assert_eq!(config.authorized_user_ids, ["U100", "U200", "U300"]);
}

#[test]
#[serial]
fn load_from_path_reads_file() {
    clear_env();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ops-bot.toml");
    std::fs::write(&path, SAMPLE).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("loads");

    assert_eq!(config.app_name, "crates-io");
}

#[test]
fn load_from_missing_path_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(dir.path().join("absent.toml"));

    match result {
        Err(AppError::Config(msg)) => assert!(msg.contains("failed to read config")),
        other => panic!("expected config error, got: {other:?}"),
    }
}

#[test]
#[serial]
fn authorization_checks_the_allow_list() {
    clear_env();
    let config = GlobalConfig::from_toml_str(SAMPLE).expect("parses");

    assert!(config.is_authorized("U100"));
    assert!(!config.is_authorized("U999"));
    assert!(config.ensure_authorized("U200").is_ok());
    match config.ensure_authorized("U999") {
        Err(AppError::Unauthorized(msg)) => assert!(msg.contains("U999")),
        other => panic!("expected unauthorized, got: {other:?}"),
    }
}

#[test]
fn user_list_parsing_drops_blanks() {
    assert_eq!(parse_user_list("123,456"), ["123", "456"]);
    assert_eq!(parse_user_list(" 123 , ,456,"), ["123", "456"]);
    assert!(parse_user_list("").is_empty());
}

#[test]
#[serial]
fn only_listed_config_vars_are_settable() {
    clear_env();
    let config = GlobalConfig::from_toml_str(SAMPLE).expect("parses");

    assert!(config.ensure_config_var_settable("MAINTENANCE_MESSAGE").is_ok());
    match config.ensure_config_var_settable("DATABASE_URL") {
        Err(AppError::Unauthorized(msg)) => assert!(msg.contains("DATABASE_URL")),
        other => panic!("expected unauthorized, got: {other:?}"),
    }
}

#[test]
#[serial]
fn no_config_vars_are_settable_by_default() {
    clear_env();
    let config = GlobalConfig::from_toml_str("app_name = \"staging\"").expect("parses");

    assert!(config.settable_config_vars.is_empty());
    assert!(config.ensure_config_var_settable("MAINTENANCE_MESSAGE").is_err());
}
