use signoff_core::UserId;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub trigger_id: String,
}

/// A slash command invocation that asks for the approval request form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalCommand {
    pub requester_id: UserId,
    pub trigger_id: String,
    pub prefill_details: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error("slash command `{0}` arrived without a trigger id")]
    MissingTrigger(String),
}

pub fn normalize_approval_command(
    payload: SlashCommandPayload,
    expected_command: &str,
) -> Result<ApprovalCommand, CommandParseError> {
    let command = payload.command.trim();
    if !command.eq_ignore_ascii_case(expected_command.trim()) {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    if payload.trigger_id.trim().is_empty() {
        return Err(CommandParseError::MissingTrigger(payload.command));
    }

    let text = payload.text.trim();
    let prefill_details = if text.is_empty() { None } else { Some(text.to_owned()) };

    Ok(ApprovalCommand {
        requester_id: UserId(payload.user_id),
        trigger_id: payload.trigger_id,
        prefill_details,
    })
}
