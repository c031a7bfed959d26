//! Slack Web API binding.
//!
//! [`SlackApi`] is the narrow surface the approval workflow needs from the
//! platform. [`SlackWebClient`] implements it over HTTPS; tests substitute a
//! recording fake.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use signoff_core::config::SlackConfig;
use signoff_core::{ChannelId, MessageId, UserId};
use thiserror::Error;
use tracing::debug;

use crate::blocks::{MessageTemplate, ModalView};

#[derive(Debug, Error)]
pub enum SlackApiError {
    #[error("could not build slack http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("slack request `{method}` failed: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("slack method `{method}` returned error `{error}`")]
    Api { method: &'static str, error: String },
    #[error("slack method `{method}` returned an unexpected body: {message}")]
    Decode { method: &'static str, message: String },
}

/// Slack error codes that describe an outage or throttling on Slack's side
/// rather than a problem with what was sent.
const TRANSIENT_API_ERRORS: [&str; 5] =
    ["ratelimited", "fatal_error", "internal_error", "service_unavailable", "request_timeout"];

impl SlackApiError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Decode { .. } => true,
            Self::Api { error, .. } => TRANSIENT_API_ERRORS.contains(&error.as_str()),
            Self::Client(_) => false,
        }
    }
}

/// Where a message ended up after `chat.postMessage`.
///
/// Posting to a user id lands in the bot's DM with that user, so the channel
/// returned here differs from the target passed in.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PostedMessage {
    #[serde(rename = "channel")]
    pub channel_id: ChannelId,
    #[serde(rename = "ts")]
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    pub team: String,
    pub user_id: UserId,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError>;

    async fn post_message(
        &self,
        target: &str,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, SlackApiError>;

    async fn update_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;

    async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<(), SlackApiError>;

    async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError>;
}

pub struct SlackWebClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
    app_token: SecretString,
}

impl SlackWebClient {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        app_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, SlackApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("signoff/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SlackApiError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            bot_token,
            app_token,
        })
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, SlackApiError> {
        Self::new(
            config.api_base_url.clone(),
            config.bot_token.clone(),
            config.app_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Requests a fresh Socket Mode WebSocket URL using the app-level token.
    pub async fn open_socket_connection(&self) -> Result<String, SlackApiError> {
        #[derive(Deserialize)]
        struct ConnectionsOpen {
            url: String,
        }

        let response: ConnectionsOpen =
            self.call("apps.connections.open", &self.app_token, json!({})).await?;
        Ok(response.url)
    }

    async fn call<T>(
        &self,
        method: &'static str,
        token: &SecretString,
        body: Value,
    ) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/{method}", self.base_url);
        debug!(event_name = "egress.slack.request", method, "calling slack web api");

        let response = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|source| SlackApiError::Http { method, source })?;

        let payload = response
            .error_for_status()
            .map_err(|source| SlackApiError::Http { method, source })?
            .json::<Value>()
            .await
            .map_err(|source| SlackApiError::Http { method, source })?;

        decode_response(method, payload)
    }
}

#[async_trait]
impl SlackApi for SlackWebClient {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError> {
        let body = json!({ "trigger_id": trigger_id, "view": view });
        let _: Value = self.call("views.open", &self.bot_token, body).await?;
        Ok(())
    }

    async fn post_message(
        &self,
        target: &str,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, SlackApiError> {
        self.call("chat.postMessage", &self.bot_token, post_message_body(target, message)).await
    }

    async fn update_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        let body = json!({
            "channel": channel_id.0,
            "ts": message_id.0,
            "text": message.fallback_text,
            "blocks": message.blocks,
        });
        let _: Value = self.call("chat.update", &self.bot_token, body).await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<(), SlackApiError> {
        let body = json!({ "channel": channel_id.0, "ts": message_id.0 });
        let _: Value = self.call("chat.delete", &self.bot_token, body).await?;
        Ok(())
    }

    async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError> {
        self.call("auth.test", &self.bot_token, json!({})).await
    }
}

fn post_message_body(target: &str, message: &MessageTemplate) -> Value {
    json!({
        "channel": target,
        "text": message.fallback_text,
        "blocks": message.blocks,
    })
}

/// Slack answers HTTP 200 for application errors and reports them through
/// the `ok`/`error` pair in the body.
fn decode_response<T>(method: &'static str, payload: Value) -> Result<T, SlackApiError>
where
    T: DeserializeOwned,
{
    match payload.get("ok").and_then(Value::as_bool) {
        Some(true) => {}
        Some(false) => {
            let error = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_owned();
            return Err(SlackApiError::Api { method, error });
        }
        None => {
            return Err(SlackApiError::Decode {
                method,
                message: "response is missing the `ok` flag".to_owned(),
            });
        }
    }

    serde_json::from_value(payload)
        .map_err(|error| SlackApiError::Decode { method, message: error.to_string() })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use signoff_core::{ChannelId, MessageId, UserId};

    use super::{decode_response, post_message_body, AuthIdentity, PostedMessage, SlackApiError};
    use crate::blocks::approval_request_message;

    #[test]
    fn post_message_body_carries_fallback_text_and_blocks() {
        let message = approval_request_message(&UserId("U1".to_owned()), "Need budget sign-off");
        let body = post_message_body("U2", &message);

        assert_eq!(body["channel"], "U2");
        assert_eq!(body["text"], "New approval request from <@U1>");
        assert_eq!(body["blocks"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn decodes_posted_message_identity() {
        let posted: PostedMessage = decode_response(
            "chat.postMessage",
            json!({ "ok": true, "channel": "D024BE91L", "ts": "1401383885.000061" }),
        )
        .expect("decode");

        assert_eq!(posted.channel_id, ChannelId("D024BE91L".to_owned()));
        assert_eq!(posted.message_id, MessageId("1401383885.000061".to_owned()));
    }

    #[test]
    fn surfaces_slack_error_code() {
        let error = decode_response::<Value>(
            "chat.postMessage",
            json!({ "ok": false, "error": "channel_not_found" }),
        )
        .expect_err("ok=false should be an error");

        assert!(matches!(
            error,
            SlackApiError::Api { method: "chat.postMessage", ref error } if error == "channel_not_found"
        ));
    }

    #[test]
    fn only_outage_codes_are_transient() {
        let api = |error: &str| SlackApiError::Api { method: "chat.postMessage", error: error.to_owned() };

        assert!(api("ratelimited").is_transient());
        assert!(api("fatal_error").is_transient());
        assert!(!api("invalid_blocks").is_transient());
        assert!(!api("channel_not_found").is_transient());
        assert!(SlackApiError::Decode { method: "auth.test", message: "empty".to_owned() }
            .is_transient());
    }

    #[test]
    fn missing_ok_flag_is_a_decode_error() {
        let error = decode_response::<Value>("auth.test", json!({ "team": "acme" }))
            .expect_err("body without ok flag should fail");

        assert!(matches!(error, SlackApiError::Decode { method: "auth.test", .. }));
    }

    #[test]
    fn decodes_auth_identity_without_bot_id() {
        let identity: AuthIdentity = decode_response(
            "auth.test",
            json!({ "ok": true, "team": "Acme", "user": "signoff", "user_id": "UBOT" }),
        )
        .expect("decode");

        assert_eq!(identity.user_id, UserId("UBOT".to_owned()));
        assert_eq!(identity.bot_id, None);
    }
}
