//! Unit tests for screening slash command text before it runs.

use ops_bot::bot::commands::OpsCommand;
use ops_bot::config::{GlobalConfig, SlackConfig};
use ops_bot::slack::commands::screen;

fn config() -> GlobalConfig {
    GlobalConfig {
        app_name: "crates-io".into(),
        heroku_cli: "heroku".into(),
        authorized_user_ids: vec!["U100".into()],
        settable_config_vars: Vec::new(),
        slack: SlackConfig::default(),
        heroku_api_key: None,
    }
}

#[test]
fn authorized_user_may_run_privileged_commands() {
    assert_eq!(screen(&config(), "U100", "restart"), Ok(OpsCommand::Restart));
}

#[test]
fn anyone_may_run_public_commands() {
    assert_eq!(screen(&config(), "U999", "ping"), Ok(OpsCommand::Ping));
    assert_eq!(screen(&config(), "U999", "help"), Ok(OpsCommand::Help));
}

#[test]
fn unauthorized_reply_states_the_refusal_once() {
    let reply = screen(&config(), "U999", "restart").expect_err("refused");

    assert_eq!(reply, "User <@U999> is not authorized to run this command");
}

#[test]
fn parse_failure_is_explained() {
    let reply = screen(&config(), "U100", "deploy main").expect_err("refused");

    assert_eq!(
        reply,
        "Error running command: command: unrecognized command: deploy main"
    );
}
