use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use signoff_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use super::CommandResult;

struct FieldSpec {
    key: &'static str,
    env_keys: &'static [&'static str],
}

const APP_TOKEN: FieldSpec =
    FieldSpec { key: "slack.app_token", env_keys: &["SIGNOFF_SLACK_APP_TOKEN", "SLACK_APP_TOKEN"] };
const BOT_TOKEN: FieldSpec =
    FieldSpec { key: "slack.bot_token", env_keys: &["SIGNOFF_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"] };
const SIGNING_SECRET: FieldSpec = FieldSpec {
    key: "slack.signing_secret",
    env_keys: &["SIGNOFF_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET"],
};
const COMMAND: FieldSpec = FieldSpec { key: "slack.command", env_keys: &["SIGNOFF_SLACK_COMMAND"] };
const API_BASE_URL: FieldSpec =
    FieldSpec { key: "slack.api_base_url", env_keys: &["SIGNOFF_SLACK_API_BASE_URL"] };
const REQUEST_TIMEOUT: FieldSpec = FieldSpec {
    key: "slack.request_timeout_secs",
    env_keys: &["SIGNOFF_SLACK_REQUEST_TIMEOUT_SECS"],
};
const BIND_ADDRESS: FieldSpec =
    FieldSpec { key: "server.bind_address", env_keys: &["SIGNOFF_SERVER_BIND_ADDRESS"] };
const PORT: FieldSpec = FieldSpec { key: "server.port", env_keys: &["SIGNOFF_SERVER_PORT", "PORT"] };
const LOG_LEVEL: FieldSpec =
    FieldSpec { key: "logging.level", env_keys: &["SIGNOFF_LOGGING_LEVEL", "SIGNOFF_LOG_LEVEL"] };
const LOG_FORMAT: FieldSpec =
    FieldSpec { key: "logging.format", env_keys: &["SIGNOFF_LOGGING_FORMAT", "SIGNOFF_LOG_FORMAT"] };

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("config", "config_validation", error.to_string(), 2)
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |field: &FieldSpec| {
        field_source(field.key, field.env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let signing_secret = match &config.slack.signing_secret {
        Some(_) => "<redacted>",
        None => "<unset>",
    };

    let fields = [
        (&APP_TOKEN, redact_token(config.slack.app_token.expose_secret())),
        (&BOT_TOKEN, redact_token(config.slack.bot_token.expose_secret())),
        (&SIGNING_SECRET, signing_secret.to_string()),
        (&COMMAND, config.slack.command.clone()),
        (&API_BASE_URL, config.slack.api_base_url.clone()),
        (&REQUEST_TIMEOUT, config.slack.request_timeout_secs.to_string()),
        (&BIND_ADDRESS, config.server.bind_address.clone()),
        (&PORT, config.server.port.to_string()),
        (&LOG_LEVEL, config.logging.level.clone()),
        (&LOG_FORMAT, format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(|(field, value)| render_line(field.key, value, source(field))));

    CommandResult::report(0, lines.join("\n"))
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
