use std::collections::HashMap;

use async_trait::async_trait;
use signoff_core::{ChannelId, MessageId, UserId};
use tokio::sync::Mutex;

use crate::blocks::{MessageTemplate, ModalView};
use crate::client::{AuthIdentity, PostedMessage, SlackApi, SlackApiError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedCall {
    OpenView { trigger_id: String, view: ModalView },
    PostMessage { target: String, message: MessageTemplate },
    UpdateMessage { channel_id: ChannelId, message_id: MessageId, message: MessageTemplate },
    DeleteMessage { channel_id: ChannelId, message_id: MessageId },
}

/// In-memory [`SlackApi`] that records every call and fails the methods it
/// is told to fail with `ok: false`. `fail` uses Slack's `fatal_error` code.
#[derive(Default)]
pub struct RecordingSlackApi {
    calls: Mutex<Vec<RecordedCall>>,
    failing: Mutex<HashMap<&'static str, String>>,
    posted: Mutex<Vec<PostedMessage>>,
}

impl RecordingSlackApi {
    pub async fn fail(&self, method: &'static str) {
        self.fail_with(method, "fatal_error").await;
    }

    pub async fn fail_with(&self, method: &'static str, error: &str) {
        self.failing.lock().await.insert(method, error.to_owned());
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn posted_to(&self, target: &str) -> Vec<MessageTemplate> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                RecordedCall::PostMessage { target: posted, message } if posted == target => {
                    Some(message.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub async fn post_count(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| matches!(call, RecordedCall::PostMessage { .. }))
            .count()
    }

    pub async fn last_posted_message_id(&self) -> Option<MessageId> {
        self.posted.lock().await.last().map(|posted| posted.message_id.clone())
    }

    async fn check(&self, method: &'static str) -> Result<(), SlackApiError> {
        if let Some(error) = self.failing.lock().await.get(method) {
            return Err(SlackApiError::Api { method, error: error.clone() });
        }
        Ok(())
    }
}

#[async_trait]
impl SlackApi for RecordingSlackApi {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError> {
        self.calls.lock().await.push(RecordedCall::OpenView {
            trigger_id: trigger_id.to_owned(),
            view: view.clone(),
        });
        self.check("views.open").await
    }

    async fn post_message(
        &self,
        target: &str,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, SlackApiError> {
        self.calls.lock().await.push(RecordedCall::PostMessage {
            target: target.to_owned(),
            message: message.clone(),
        });
        self.check("chat.postMessage").await?;

        let mut posted = self.posted.lock().await;
        let message = PostedMessage {
            channel_id: ChannelId(format!("D-{target}")),
            message_id: MessageId(format!("1700000000.{:06}", posted.len() + 1)),
        };
        posted.push(message.clone());
        Ok(message)
    }

    async fn update_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        self.calls.lock().await.push(RecordedCall::UpdateMessage {
            channel_id: channel_id.clone(),
            message_id: message_id.clone(),
            message: message.clone(),
        });
        self.check("chat.update").await
    }

    async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<(), SlackApiError> {
        self.calls.lock().await.push(RecordedCall::DeleteMessage {
            channel_id: channel_id.clone(),
            message_id: message_id.clone(),
        });
        self.check("chat.delete").await
    }

    async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError> {
        self.check("auth.test").await?;
        Ok(AuthIdentity {
            team: "Acme".to_owned(),
            user_id: UserId("UBOT".to_owned()),
            bot_id: Some("BBOT".to_owned()),
        })
    }
}
