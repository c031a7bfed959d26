//! Approval request lifecycle: open the form, post the request to the
//! approver, resolve it when a button is clicked.

use std::sync::Arc;

use signoff_core::{
    ApprovalDecision, ApprovalRecord, ApprovalRegistry, ApprovalStatus, DomainError,
    InterfaceError, MessageId, UserId,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    blocks::{
        approval_request_message, approval_request_modal, approver_confirmation_message,
        error_message, requester_outcome_message, resolved_request_message,
    },
    client::{SlackApi, SlackApiError},
    commands::ApprovalCommand,
    events::EventContext,
};

/// Values read from a submitted request form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSubmission {
    pub requester_id: UserId,
    pub approver_id: Option<UserId>,
    pub details: Option<String>,
}

/// A click on the Approve or Reject button of a posted request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalClick {
    pub message_id: MessageId,
    pub actor_id: UserId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionProblem {
    MissingApprover,
    MissingDetails,
}

impl SubmissionProblem {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingApprover => "missing_approver",
            Self::MissingDetails => "missing_details",
        }
    }

    fn user_message(self) -> &'static str {
        match self {
            Self::MissingApprover => "Your approval request was not sent. Pick an approver and try again.",
            Self::MissingDetails => {
                "Your approval request was not sent. Describe what needs approving and try again."
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkflowOutcome {
    FormOpened,
    RequestPosted { message_id: MessageId, approver_id: UserId },
    RequestRejected { reason: SubmissionProblem },
    Resolved { message_id: MessageId, status: ApprovalStatus },
    UnknownApproval { message_id: MessageId },
    /// Someone other than the chosen approver clicked. The request stays
    /// pending and the clicker gets no reply, the same as a stale click.
    NotApprover { message_id: MessageId, actor_id: UserId },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("slack call failed while {step}: {source}")]
    Provider {
        step: &'static str,
        #[source]
        source: SlackApiError,
    },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl WorkflowError {
    /// Transient Slack failures ask the user to retry. Anything Slack refused
    /// because of what was sent is reported as a bad request.
    pub fn interface(&self, correlation_id: impl Into<String>) -> InterfaceError {
        match self {
            Self::Provider { source, .. } if source.is_transient() => {
                InterfaceError::ServiceUnavailable {
                    message: self.to_string(),
                    correlation_id: correlation_id.into(),
                }
            }
            Self::Provider { .. } => InterfaceError::BadRequest {
                message: self.to_string(),
                correlation_id: correlation_id.into(),
            },
            Self::Domain(error) => error.clone().into_interface(correlation_id),
        }
    }

    fn provider(step: &'static str) -> impl FnOnce(SlackApiError) -> Self {
        move |source| Self::Provider { step, source }
    }
}

pub struct ApprovalWorkflow<A> {
    api: Arc<A>,
    registry: Arc<ApprovalRegistry>,
}

impl<A> ApprovalWorkflow<A>
where
    A: SlackApi,
{
    pub fn new(api: Arc<A>, registry: Arc<ApprovalRegistry>) -> Self {
        Self { api, registry }
    }

    pub async fn open_request_form(
        &self,
        command: &ApprovalCommand,
        ctx: &EventContext,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let view = approval_request_modal(command.prefill_details.as_deref());

        if let Err(source) = self.api.open_view(&command.trigger_id, &view).await {
            let error = WorkflowError::provider("opening the request form")(source);
            self.notify_failure(&command.requester_id, &error, ctx).await;
            return Err(error);
        }

        info!(
            event_name = "approval.form.opened",
            correlation_id = %ctx.correlation_id,
            requester_id = %command.requester_id,
            prefilled = command.prefill_details.is_some(),
            "approval request form opened"
        );
        Ok(WorkflowOutcome::FormOpened)
    }

    pub async fn submit_request(
        &self,
        submission: &RequestSubmission,
        ctx: &EventContext,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let (approver_id, details) = match validate(submission) {
            Ok(valid) => valid,
            Err(problem) => {
                info!(
                    event_name = "approval.request.invalid",
                    correlation_id = %ctx.correlation_id,
                    requester_id = %submission.requester_id,
                    reason = problem.as_str(),
                    "approval request rejected before posting"
                );
                let message = error_message(problem.user_message(), &ctx.correlation_id);
                if let Err(error) = self.api.post_message(&submission.requester_id.0, &message).await
                {
                    warn!(
                        event_name = "approval.request.invalid_notice_failed",
                        correlation_id = %ctx.correlation_id,
                        error = %error,
                        "could not tell requester why the request was not sent"
                    );
                }
                return Ok(WorkflowOutcome::RequestRejected { reason: problem });
            }
        };

        let message = approval_request_message(&submission.requester_id, details);
        let posted = match self.api.post_message(&approver_id.0, &message).await {
            Ok(posted) => posted,
            Err(source) => {
                let error = WorkflowError::provider("posting the approval request")(source);
                self.notify_failure(&submission.requester_id, &error, ctx).await;
                return Err(error);
            }
        };

        let record = ApprovalRecord::pending(
            posted.message_id.clone(),
            posted.channel_id,
            submission.requester_id.clone(),
            approver_id.clone(),
            details,
        );
        if let Some(replaced) = self.registry.put(record).await {
            warn!(
                event_name = "approval.request.overwritten",
                correlation_id = %ctx.correlation_id,
                message_id = %replaced.message_id,
                "pending approval replaced by a request with the same message id"
            );
        }

        info!(
            event_name = "approval.request.posted",
            correlation_id = %ctx.correlation_id,
            message_id = %posted.message_id,
            requester_id = %submission.requester_id,
            approver_id = %approver_id,
            "approval request posted to approver"
        );
        Ok(WorkflowOutcome::RequestPosted { message_id: posted.message_id, approver_id })
    }

    /// Applies the approver's decision. Only the approver recorded on the
    /// request may resolve it; anyone else's click leaves it pending.
    pub async fn resolve_request(
        &self,
        click: &ApprovalClick,
        decision: ApprovalDecision,
        ctx: &EventContext,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let Some(pending) = self.registry.get(&click.message_id).await else {
            return Ok(self.unknown(click, ctx));
        };

        if pending.approver_id != click.actor_id {
            info!(
                event_name = "approval.request.not_approver",
                correlation_id = %ctx.correlation_id,
                message_id = %click.message_id,
                actor_id = %click.actor_id,
                approver_id = %pending.approver_id,
                "ignoring click from someone other than the approver"
            );
            return Ok(WorkflowOutcome::NotApprover {
                message_id: click.message_id.clone(),
                actor_id: click.actor_id.clone(),
            });
        }

        // A concurrent click may have resolved the record since the lookup.
        let Some(record) = self.registry.resolve(&click.message_id, decision).await? else {
            return Ok(self.unknown(click, ctx));
        };

        self.retire_request_message(&record, decision, ctx).await;

        let requester_notice = requester_outcome_message(decision, &record.approver_id);
        self.api
            .post_message(&record.requester_id.0, &requester_notice)
            .await
            .map_err(WorkflowError::provider("notifying the requester"))?;

        let confirmation =
            approver_confirmation_message(decision, &record.requester_id, &record.details);
        self.api
            .post_message(&record.approver_id.0, &confirmation)
            .await
            .map_err(WorkflowError::provider("confirming to the approver"))?;

        info!(
            event_name = "approval.request.resolved",
            correlation_id = %ctx.correlation_id,
            message_id = %record.message_id,
            status = record.status.as_str(),
            requester_id = %record.requester_id,
            approver_id = %record.approver_id,
            pending_for_secs = (chrono::Utc::now() - record.requested_at).num_seconds(),
            "approval request resolved"
        );
        Ok(WorkflowOutcome::Resolved { message_id: record.message_id, status: record.status })
    }

    fn unknown(&self, click: &ApprovalClick, ctx: &EventContext) -> WorkflowOutcome {
        info!(
            event_name = "approval.request.unknown",
            correlation_id = %ctx.correlation_id,
            message_id = %click.message_id,
            actor_id = %click.actor_id,
            "click on an approval that is not pending"
        );
        WorkflowOutcome::UnknownApproval { message_id: click.message_id.clone() }
    }

    /// Deletes the approval message, or strips its buttons when Slack refuses
    /// the delete. Neither failure stops the notifications.
    async fn retire_request_message(
        &self,
        record: &ApprovalRecord,
        decision: ApprovalDecision,
        ctx: &EventContext,
    ) {
        let Err(error) = self.api.delete_message(&record.channel_id, &record.message_id).await
        else {
            return;
        };
        warn!(
            event_name = "approval.message.delete_failed",
            correlation_id = %ctx.correlation_id,
            message_id = %record.message_id,
            error = %error,
            "could not delete approval message, replacing it instead"
        );

        let replacement = resolved_request_message(
            decision,
            &record.requester_id,
            &record.approver_id,
            &record.details,
        );
        if let Err(error) =
            self.api.update_message(&record.channel_id, &record.message_id, &replacement).await
        {
            warn!(
                event_name = "approval.message.update_failed",
                correlation_id = %ctx.correlation_id,
                message_id = %record.message_id,
                error = %error,
                "approval message left with live buttons"
            );
        }
    }

    async fn notify_failure(&self, user_id: &UserId, error: &WorkflowError, ctx: &EventContext) {
        let interface = error.interface(ctx.correlation_id.clone());
        let message = error_message(interface.user_message(), interface.correlation_id());
        if let Err(notify_error) = self.api.post_message(&user_id.0, &message).await {
            warn!(
                event_name = "approval.error_notice.failed",
                correlation_id = %ctx.correlation_id,
                error = %notify_error,
                "could not deliver error notice"
            );
        }
    }
}

fn validate(submission: &RequestSubmission) -> Result<(UserId, &str), SubmissionProblem> {
    let approver_id = submission
        .approver_id
        .as_ref()
        .filter(|approver| !approver.0.trim().is_empty())
        .ok_or(SubmissionProblem::MissingApprover)?;

    let details = submission
        .details
        .as_deref()
        .map(str::trim)
        .filter(|details| !details.is_empty())
        .ok_or(SubmissionProblem::MissingDetails)?;

    Ok((approver_id.clone(), details))
}
