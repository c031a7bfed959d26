use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::client::SlackWebClient;
use crate::events::{EventContext, EventDispatcher, SlackEnvelope, SlackEvent};
use crate::payload::{parse_socket_frame, SocketFrame};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the transport has nothing more to deliver and the
    /// runner should stop.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a real WebSocket. Each `connect` asks Slack for a fresh
/// URL, so Slack-initiated disconnects surface as receive errors and the
/// runner reconnects.
pub struct WebSocketTransport {
    client: Arc<SlackWebClient>,
    stream: Mutex<Option<SocketStream>>,
}

impl WebSocketTransport {
    pub fn new(client: Arc<SlackWebClient>) -> Self {
        Self { client, stream: Mutex::new(None) }
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .client
            .open_socket_connection()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (stream, _) =
            connect_async(url).await.map_err(|error| TransportError::Connect(error.to_string()))?;

        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream =
            guard.as_mut().ok_or_else(|| TransportError::Receive("not connected".to_owned()))?;

        loop {
            let Some(message) = stream.next().await else {
                return Err(TransportError::Receive("socket closed".to_owned()));
            };
            let message = message.map_err(|error| TransportError::Receive(error.to_string()))?;

            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    let reason = frame.map(|frame| frame.reason.into_owned()).unwrap_or_default();
                    return Err(TransportError::Receive(format!("socket closed by peer: {reason}")));
                }
                _ => continue,
            };

            match parse_socket_frame(&text) {
                Ok(SocketFrame::Hello) => debug!("socket mode hello received"),
                Ok(SocketFrame::Disconnect { reason }) => {
                    return Err(TransportError::Receive(format!(
                        "slack requested disconnect: {}",
                        reason.as_deref().unwrap_or("unspecified")
                    )));
                }
                Ok(SocketFrame::Envelope(envelope)) => return Ok(Some(envelope)),
                Err(error) => warn!(error = %error, "dropping unreadable socket mode frame"),
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TransportError::Acknowledge("not connected".to_owned()))?;

        let ack = json!({ "envelope_id": envelope_id }).to_string();
        stream
            .send(Message::Text(ack))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        stream.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Pumps envelopes until the transport reports end of stream or
    /// reconnects are exhausted. Consecutive failures are counted from the
    /// last successful connect.
    pub async fn start(&self) -> Result<()> {
        let mut failures = 0_u32;

        loop {
            let mut connected = false;
            let Err(transport_error) = self.connect_and_pump(failures, &mut connected).await else {
                return Ok(());
            };

            if connected {
                failures = 0;
            }
            failures += 1;

            warn!(
                attempt = failures,
                max_retries = self.reconnect_policy.max_retries,
                error = %transport_error,
                "socket mode transport failed"
            );

            if failures > self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "socket mode retries exhausted; continuing process without crash"
                );
                return Ok(());
            }

            let delay = self.reconnect_policy.backoff(failures - 1);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn connect_and_pump(
        &self,
        attempt: u32,
        connected: &mut bool,
    ) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        *connected = true;
        info!(attempt, "socket mode transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (message_id, user_id) = correlation_fields(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                message_id = message_id.unwrap_or("unknown"),
                user_id = user_id.unwrap_or("unknown"),
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(result) => debug!(
                    event_name = "ingress.slack.dispatched",
                    correlation_id = %envelope.envelope_id,
                    result = ?result,
                    "slack envelope handled"
                ),
                Err(error) => warn!(
                    event_name = "ingress.slack.dispatch_failed",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    message_id = message_id.unwrap_or("unknown"),
                    user_id = user_id.unwrap_or("unknown"),
                    error = %error,
                    "event dispatch failed; continuing socket loop"
                ),
            }
        }
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    let message_id = match &envelope.event {
        SlackEvent::BlockAction(event) => Some(event.message_ts.as_str()),
        _ => None,
    };
    (message_id, envelope.event.user_id())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use super::{ReconnectPolicy, SocketModeRunner, SocketTransport, TransportError};
    use crate::commands::SlashCommandPayload;
    use crate::events::{approval_dispatcher, EventDispatcher, SlackEnvelope, SlackEvent};
    use crate::testing::{RecordedCall, RecordingSlackApi};
    use crate::workflow::ApprovalWorkflow;
    use async_trait::async_trait;
    use signoff_core::ApprovalRegistry;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        disconnect_results: VecDeque<Result<(), TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
            disconnect_results: Vec<Result<(), TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    disconnect_results: disconnect_results.into(),
                    connect_attempts: 0,
                    acknowledgements: Vec::new(),
                    disconnect_calls: 0,
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            state.disconnect_results.pop_front().unwrap_or(Ok(()))
        }
    }

    fn no_delay(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    fn unsupported(envelope_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: SlackEvent::Unsupported { event_type: "test".to_owned() },
        }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(unsupported("env-1"))), Ok(None)],
            vec![Ok(())],
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
            vec![],
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn successful_connect_resets_failure_count() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Ok(()),
                Err(TransportError::Connect("fail-2".to_owned())),
            ],
            vec![Err(TransportError::Receive("slack requested disconnect: refresh".to_owned()))],
            vec![],
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(1));

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn acknowledges_and_dispatches_slash_command() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-cmd".to_owned(),
                    event: SlackEvent::SlashCommand(SlashCommandPayload {
                        command: "/approval-test".to_owned(),
                        text: String::new(),
                        user_id: "U1".to_owned(),
                        trigger_id: "trigger-1".to_owned(),
                    }),
                })),
                Ok(None),
            ],
            vec![],
        ));
        let api = Arc::new(RecordingSlackApi::default());
        let workflow =
            Arc::new(ApprovalWorkflow::new(api.clone(), Arc::new(ApprovalRegistry::new())));

        let runner = SocketModeRunner::new(
            transport.clone(),
            approval_dispatcher(workflow, "/approval-test"),
            no_delay(0),
        );
        runner.start().await.expect("runner");

        assert_eq!(transport.acknowledgements().await, vec!["env-cmd"]);
        assert!(matches!(api.calls().await.as_slice(), [RecordedCall::OpenView { .. }]));
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_stop_the_loop() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-bad".to_owned(),
                    event: SlackEvent::SlashCommand(SlashCommandPayload {
                        command: "/approval-test".to_owned(),
                        text: String::new(),
                        user_id: "U1".to_owned(),
                        trigger_id: String::new(),
                    }),
                })),
                Ok(Some(unsupported("env-next"))),
                Ok(None),
            ],
            vec![],
        ));
        let api = Arc::new(RecordingSlackApi::default());
        let workflow =
            Arc::new(ApprovalWorkflow::new(api.clone(), Arc::new(ApprovalRegistry::new())));

        let runner = SocketModeRunner::new(
            transport.clone(),
            approval_dispatcher(workflow, "/approval-test"),
            no_delay(0),
        );
        runner.start().await.expect("runner");

        assert_eq!(transport.acknowledgements().await, vec!["env-bad", "env-next"]);
        assert!(api.calls().await.is_empty());
    }

    #[test]
    fn extracts_message_and_user_correlation_fields() {
        let envelope = SlackEnvelope {
            envelope_id: "env-2".to_owned(),
            event: SlackEvent::BlockAction(crate::events::BlockActionEvent {
                message_ts: "1730000000.1000".to_owned(),
                user_id: "U2".to_owned(),
                action_id: crate::blocks::APPROVE_ACTION_ID.to_owned(),
            }),
        };

        let (message_id, user_id) = super::correlation_fields(&envelope);
        assert_eq!(message_id, Some("1730000000.1000"));
        assert_eq!(user_id, Some("U2"));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy { max_retries: 10, base_delay_ms: 250, max_delay_ms: 5_000 };
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(2).as_millis(), 1_000);
        assert_eq!(policy.backoff(12).as_millis(), 5_000);
    }
}
