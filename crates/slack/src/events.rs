use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use signoff_core::{ApprovalDecision, MessageId, UserId};
use thiserror::Error;

use crate::{
    blocks::{
        APPROVER_ACTION_ID, APPROVER_BLOCK_ID, APPROVE_ACTION_ID, DETAILS_ACTION_ID,
        DETAILS_BLOCK_ID, REJECT_ACTION_ID, REQUEST_MODAL_CALLBACK_ID,
    },
    client::SlackApi,
    commands::{normalize_approval_command, CommandParseError, SlashCommandPayload},
    workflow::{ApprovalClick, ApprovalWorkflow, RequestSubmission, WorkflowError, WorkflowOutcome},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    ViewSubmission(ViewSubmissionEvent),
    BlockAction(BlockActionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(payload) => Some(&payload.user_id),
            Self::ViewSubmission(event) => Some(&event.user_id),
            Self::BlockAction(event) => Some(&event.user_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    ViewSubmission,
    BlockAction,
    Unsupported,
}

/// One input element's state inside a submitted view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ViewStateValue {
    #[serde(default)]
    pub selected_user: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// Submitted input state, keyed by block id then action id.
pub type ViewState = BTreeMap<String, BTreeMap<String, ViewStateValue>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewSubmissionEvent {
    pub user_id: String,
    pub callback_id: String,
    pub state: ViewState,
}

impl ViewSubmissionEvent {
    fn input(&self, block_id: &str, action_id: &str) -> Option<&ViewStateValue> {
        self.state.get(block_id)?.get(action_id)
    }

    pub fn selected_user(&self, block_id: &str, action_id: &str) -> Option<&str> {
        self.input(block_id, action_id)?.selected_user.as_deref()
    }

    pub fn text_value(&self, block_id: &str, action_id: &str) -> Option<&str> {
        self.input(block_id, action_id)?.value.as_deref()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub message_ts: String,
    pub user_id: String,
    pub action_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed(WorkflowOutcome),
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Registers the three approval handlers against one shared workflow.
pub fn approval_dispatcher<A>(
    workflow: Arc<ApprovalWorkflow<A>>,
    command: impl Into<String>,
) -> EventDispatcher
where
    A: SlackApi + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(workflow.clone(), command));
    dispatcher.register(ViewSubmissionHandler::new(workflow.clone()));
    dispatcher.register(BlockActionHandler::new(workflow));
    dispatcher
}

pub struct SlashCommandHandler<A> {
    workflow: Arc<ApprovalWorkflow<A>>,
    command: String,
}

impl<A> SlashCommandHandler<A>
where
    A: SlackApi,
{
    pub fn new(workflow: Arc<ApprovalWorkflow<A>>, command: impl Into<String>) -> Self {
        Self { workflow, command: command.into() }
    }
}

#[async_trait]
impl<A> EventHandler for SlashCommandHandler<A>
where
    A: SlackApi + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let command = match normalize_approval_command(payload.clone(), &self.command) {
            Ok(command) => command,
            Err(CommandParseError::UnsupportedCommand(_)) => return Ok(HandlerResult::Ignored),
            Err(error) => return Err(error.into()),
        };

        let outcome = self.workflow.open_request_form(&command, ctx).await?;
        Ok(HandlerResult::Processed(outcome))
    }
}

pub struct ViewSubmissionHandler<A> {
    workflow: Arc<ApprovalWorkflow<A>>,
}

impl<A> ViewSubmissionHandler<A>
where
    A: SlackApi,
{
    pub fn new(workflow: Arc<ApprovalWorkflow<A>>) -> Self {
        Self { workflow }
    }
}

#[async_trait]
impl<A> EventHandler for ViewSubmissionHandler<A>
where
    A: SlackApi + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewSubmission
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewSubmission(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.callback_id != REQUEST_MODAL_CALLBACK_ID {
            return Ok(HandlerResult::Ignored);
        }

        let submission = RequestSubmission {
            requester_id: UserId(event.user_id.clone()),
            approver_id: event
                .selected_user(APPROVER_BLOCK_ID, APPROVER_ACTION_ID)
                .map(|user| UserId(user.to_owned())),
            details: event.text_value(DETAILS_BLOCK_ID, DETAILS_ACTION_ID).map(str::to_owned),
        };

        let outcome = self.workflow.submit_request(&submission, ctx).await?;
        Ok(HandlerResult::Processed(outcome))
    }
}

pub struct BlockActionHandler<A> {
    workflow: Arc<ApprovalWorkflow<A>>,
}

impl<A> BlockActionHandler<A>
where
    A: SlackApi,
{
    pub fn new(workflow: Arc<ApprovalWorkflow<A>>) -> Self {
        Self { workflow }
    }
}

#[async_trait]
impl<A> EventHandler for BlockActionHandler<A>
where
    A: SlackApi + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(decision) = decision_for_action(&event.action_id) else {
            return Ok(HandlerResult::Ignored);
        };

        let click = ApprovalClick {
            message_id: MessageId(event.message_ts.clone()),
            actor_id: UserId(event.user_id.clone()),
        };

        let outcome = self.workflow.resolve_request(&click, decision, ctx).await?;
        Ok(HandlerResult::Processed(outcome))
    }
}

fn decision_for_action(action_id: &str) -> Option<ApprovalDecision> {
    match action_id {
        APPROVE_ACTION_ID => Some(ApprovalDecision::Approve),
        REJECT_ACTION_ID => Some(ApprovalDecision::Reject),
        _ => None,
    }
}
