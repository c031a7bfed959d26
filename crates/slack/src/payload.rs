//! Decoding of raw Socket Mode frames into [`SlackEnvelope`]s.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::commands::SlashCommandPayload;
use crate::events::{BlockActionEvent, SlackEnvelope, SlackEvent, ViewState, ViewSubmissionEvent};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: Option<String> },
    Envelope(SlackEnvelope),
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("socket frame is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("socket frame has no `type`")]
    MissingType,
    #[error("socket frame of type `{0}` has no `envelope_id`")]
    MissingEnvelopeId(String),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: Option<String>,
    envelope_id: Option<String>,
    reason: Option<String>,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct RawSlashCommand {
    command: String,
    #[serde(default)]
    text: String,
    user_id: String,
    #[serde(default)]
    trigger_id: String,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
}

#[derive(Deserialize)]
struct RawInteraction {
    #[serde(rename = "type")]
    interaction_type: String,
    user: RawUser,
    #[serde(default)]
    view: Option<RawView>,
    #[serde(default)]
    actions: Vec<RawAction>,
    #[serde(default)]
    container: Option<RawContainer>,
    #[serde(default)]
    message: Option<RawMessage>,
}

#[derive(Deserialize)]
struct RawView {
    #[serde(default)]
    callback_id: String,
    #[serde(default)]
    state: RawViewState,
}

#[derive(Default, Deserialize)]
struct RawViewState {
    #[serde(default)]
    values: ViewState,
}

#[derive(Deserialize)]
struct RawAction {
    action_id: String,
}

#[derive(Deserialize)]
struct RawContainer {
    #[serde(default)]
    message_ts: Option<String>,
}

#[derive(Deserialize)]
struct RawMessage {
    ts: String,
}

/// Parses one text frame received over the Socket Mode WebSocket.
///
/// Envelopes whose payload cannot be understood still parse, as
/// [`SlackEvent::Unsupported`], so the caller can acknowledge them.
pub fn parse_socket_frame(raw: &str) -> Result<SocketFrame, PayloadError> {
    let frame: RawFrame = serde_json::from_str(raw)?;
    let frame_type = frame.frame_type.ok_or(PayloadError::MissingType)?;

    match frame_type.as_str() {
        "hello" => return Ok(SocketFrame::Hello),
        "disconnect" => return Ok(SocketFrame::Disconnect { reason: frame.reason }),
        _ => {}
    }

    let envelope_id =
        frame.envelope_id.ok_or_else(|| PayloadError::MissingEnvelopeId(frame_type.clone()))?;
    let event = decode_event(&frame_type, frame.payload)
        .unwrap_or(SlackEvent::Unsupported { event_type: frame_type });

    Ok(SocketFrame::Envelope(SlackEnvelope { envelope_id, event }))
}

fn decode_event(frame_type: &str, payload: Value) -> Option<SlackEvent> {
    match frame_type {
        "slash_commands" => {
            let raw: RawSlashCommand = serde_json::from_value(payload).ok()?;
            Some(SlackEvent::SlashCommand(SlashCommandPayload {
                command: raw.command,
                text: raw.text,
                user_id: raw.user_id,
                trigger_id: raw.trigger_id,
            }))
        }
        "interactive" => decode_interaction(serde_json::from_value(payload).ok()?),
        _ => None,
    }
}

fn decode_interaction(raw: RawInteraction) -> Option<SlackEvent> {
    match raw.interaction_type.as_str() {
        "view_submission" => {
            let view = raw.view?;
            Some(SlackEvent::ViewSubmission(ViewSubmissionEvent {
                user_id: raw.user.id,
                callback_id: view.callback_id,
                state: view.state.values,
            }))
        }
        "block_actions" => {
            let action = raw.actions.into_iter().next()?;
            let message_ts = raw
                .container
                .and_then(|container| container.message_ts)
                .or_else(|| raw.message.map(|message| message.ts))?;

            Some(SlackEvent::BlockAction(BlockActionEvent {
                message_ts,
                user_id: raw.user.id,
                action_id: action.action_id,
            }))
        }
        other => Some(SlackEvent::Unsupported { event_type: format!("interactive.{other}") }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_socket_frame, PayloadError, SocketFrame};
    use crate::blocks::{
        APPROVER_ACTION_ID, APPROVER_BLOCK_ID, APPROVE_ACTION_ID, DETAILS_ACTION_ID,
        DETAILS_BLOCK_ID, REQUEST_MODAL_CALLBACK_ID,
    };
    use crate::events::SlackEvent;

    fn envelope_event(raw: serde_json::Value) -> (String, SlackEvent) {
        match parse_socket_frame(&raw.to_string()).expect("frame should parse") {
            SocketFrame::Envelope(envelope) => (envelope.envelope_id, envelope.event),
            other => panic!("expected envelope, got {other:?}"),
        }
    }

    #[test]
    fn parses_hello_and_disconnect_frames() {
        let hello = parse_socket_frame(r#"{"type":"hello","num_connections":1}"#).expect("hello");
        assert_eq!(hello, SocketFrame::Hello);

        let disconnect =
            parse_socket_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#)
                .expect("disconnect");
        assert_eq!(
            disconnect,
            SocketFrame::Disconnect { reason: Some("refresh_requested".to_owned()) }
        );
    }

    #[test]
    fn parses_slash_command_envelope() {
        let (envelope_id, event) = envelope_event(json!({
            "envelope_id": "env-1",
            "type": "slash_commands",
            "accepts_response_payload": true,
            "payload": {
                "command": "/approval-test",
                "text": "",
                "channel_id": "C1",
                "user_id": "U1",
                "trigger_id": "trigger-1"
            }
        }));

        assert_eq!(envelope_id, "env-1");
        let SlackEvent::SlashCommand(payload) = event else {
            panic!("expected slash command");
        };
        assert_eq!(payload.command, "/approval-test");
        assert_eq!(payload.user_id, "U1");
        assert_eq!(payload.trigger_id, "trigger-1");
    }

    #[test]
    fn parses_view_submission_state() {
        let (_, event) = envelope_event(json!({
            "envelope_id": "env-2",
            "type": "interactive",
            "payload": {
                "type": "view_submission",
                "user": { "id": "U1", "username": "requester" },
                "view": {
                    "id": "V1",
                    "callback_id": REQUEST_MODAL_CALLBACK_ID,
                    "state": { "values": {
                        APPROVER_BLOCK_ID: { APPROVER_ACTION_ID: {
                            "type": "users_select", "selected_user": "U2"
                        }},
                        DETAILS_BLOCK_ID: { DETAILS_ACTION_ID: {
                            "type": "plain_text_input", "value": "Need budget sign-off"
                        }}
                    }}
                }
            }
        }));

        let SlackEvent::ViewSubmission(submission) = event else {
            panic!("expected view submission");
        };
        assert_eq!(submission.user_id, "U1");
        assert_eq!(submission.callback_id, REQUEST_MODAL_CALLBACK_ID);
        assert_eq!(submission.selected_user(APPROVER_BLOCK_ID, APPROVER_ACTION_ID), Some("U2"));
        assert_eq!(
            submission.text_value(DETAILS_BLOCK_ID, DETAILS_ACTION_ID),
            Some("Need budget sign-off")
        );
    }

    #[test]
    fn parses_block_action_from_container() {
        let (_, event) = envelope_event(json!({
            "envelope_id": "env-3",
            "type": "interactive",
            "payload": {
                "type": "block_actions",
                "user": { "id": "U2" },
                "container": {
                    "type": "message",
                    "message_ts": "1700000000.000001",
                    "channel_id": "D2"
                },
                "actions": [{ "action_id": APPROVE_ACTION_ID, "value": "U1", "type": "button" }]
            }
        }));

        let SlackEvent::BlockAction(action) = event else {
            panic!("expected block action");
        };
        assert_eq!(action.message_ts, "1700000000.000001");
        assert_eq!(action.user_id, "U2");
        assert_eq!(action.action_id, APPROVE_ACTION_ID);
    }

    #[test]
    fn block_action_falls_back_to_message_ts() {
        let (_, event) = envelope_event(json!({
            "envelope_id": "env-4",
            "type": "interactive",
            "payload": {
                "type": "block_actions",
                "user": { "id": "U2" },
                "channel": { "id": "D2" },
                "message": { "ts": "1700000000.000009" },
                "actions": [{ "action_id": APPROVE_ACTION_ID }]
            }
        }));

        assert!(matches!(
            event,
            SlackEvent::BlockAction(ref action)
                if action.message_ts == "1700000000.000009"
        ));
    }

    #[test]
    fn unknown_payloads_become_unsupported_but_keep_envelope_id() {
        let (envelope_id, event) = envelope_event(json!({
            "envelope_id": "env-5",
            "type": "events_api",
            "payload": { "event": { "type": "app_mention" } }
        }));
        assert_eq!(envelope_id, "env-5");
        assert_eq!(event, SlackEvent::Unsupported { event_type: "events_api".to_owned() });

        let (_, malformed) = envelope_event(json!({
            "envelope_id": "env-6",
            "type": "slash_commands",
            "payload": { "text": "missing command and user" }
        }));
        assert!(matches!(malformed, SlackEvent::Unsupported { .. }));
    }

    #[test]
    fn view_closed_is_unsupported_interaction() {
        let (_, event) = envelope_event(json!({
            "envelope_id": "env-7",
            "type": "interactive",
            "payload": { "type": "view_closed", "user": { "id": "U1" } }
        }));

        assert_eq!(
            event,
            SlackEvent::Unsupported { event_type: "interactive.view_closed".to_owned() }
        );
    }

    #[test]
    fn rejects_frames_without_envelope_or_type() {
        assert!(matches!(
            parse_socket_frame(r#"{"type":"slash_commands","payload":{}}"#),
            Err(PayloadError::MissingEnvelopeId(ref frame_type)) if frame_type == "slash_commands"
        ));
        assert!(matches!(parse_socket_frame(r#"{"envelope_id":"x"}"#), Err(PayloadError::MissingType)));
        assert!(matches!(parse_socket_frame("not json"), Err(PayloadError::Json(_))));
    }
}
