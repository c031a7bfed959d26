use serde::Serialize;
use signoff_core::{ApprovalDecision, UserId};

pub const REQUEST_MODAL_CALLBACK_ID: &str = "approval.request.modal.v1";
pub const APPROVER_BLOCK_ID: &str = "approval.request.approver.v1";
pub const APPROVER_ACTION_ID: &str = "approval.request.approver.select.v1";
pub const DETAILS_BLOCK_ID: &str = "approval.request.details.v1";
pub const DETAILS_ACTION_ID: &str = "approval.request.details.input.v1";
pub const APPROVE_ACTION_ID: &str = "approval.approve.v1";
pub const REJECT_ACTION_ID: &str = "approval.reject.v1";

/// Longest request the form accepts. Leaves room for the header the approval
/// message adds around the details.
pub const DETAILS_MAX_LENGTH: usize = 2_900;
/// Slack rejects section blocks whose text is longer than this.
pub const SECTION_TEXT_LIMIT: usize = 3_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "button")]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Interactive element rendered inside an input block of a modal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputElement {
    UsersSelect {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
    },
    PlainTextInput {
        action_id: String,
        multiline: bool,
        max_length: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_value: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
    Input { block_id: String, label: TextObject, element: InputElement },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// A modal surface opened with `views.open`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "modal")]
pub struct ModalView {
    pub callback_id: String,
    pub title: TextObject,
    pub submit: TextObject,
    pub close: TextObject,
    pub blocks: Vec<Block>,
}

pub struct ModalBuilder {
    callback_id: String,
    title: String,
    submit: String,
    close: String,
    blocks: Vec<Block>,
}

impl ModalBuilder {
    pub fn new(callback_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            callback_id: callback_id.into(),
            title: title.into(),
            submit: "Submit".to_owned(),
            close: "Cancel".to_owned(),
            blocks: Vec::new(),
        }
    }

    pub fn submit(mut self, label: impl Into<String>) -> Self {
        self.submit = label.into();
        self
    }

    pub fn input(
        mut self,
        block_id: impl Into<String>,
        label: impl Into<String>,
        element: InputElement,
    ) -> Self {
        self.blocks.push(Block::Input {
            block_id: block_id.into(),
            label: TextObject::plain(label),
            element,
        });
        self
    }

    pub fn build(self) -> ModalView {
        ModalView {
            callback_id: self.callback_id,
            title: TextObject::plain(self.title),
            submit: TextObject::plain(self.submit),
            close: TextObject::plain(self.close),
            blocks: self.blocks,
        }
    }
}

pub fn approval_request_modal(initial_details: Option<&str>) -> ModalView {
    ModalBuilder::new(REQUEST_MODAL_CALLBACK_ID, "Request Approval")
        .submit("Submit")
        .input(
            APPROVER_BLOCK_ID,
            "Approver",
            InputElement::UsersSelect {
                action_id: APPROVER_ACTION_ID.to_owned(),
                placeholder: Some(TextObject::plain("Select approver")),
            },
        )
        .input(
            DETAILS_BLOCK_ID,
            "Details",
            InputElement::PlainTextInput {
                action_id: DETAILS_ACTION_ID.to_owned(),
                multiline: true,
                max_length: DETAILS_MAX_LENGTH,
                placeholder: Some(TextObject::plain("Request details...")),
                initial_value: initial_details.map(str::to_owned),
            },
        )
        .build()
}

pub fn approval_request_message(requester_id: &UserId, details: &str) -> MessageTemplate {
    let requester = requester_id.mention();
    MessageBuilder::new(format!("New approval request from {requester}"))
        .section("approval.request.summary.v1", |section| {
            section.mrkdwn(fit_section(format!(
                "*New Approval Request*\nFrom: {requester}\n\n{}",
                escape_mrkdwn(details)
            )));
        })
        .actions("approval.request.actions.v1", |actions| {
            actions
                .button(
                    ButtonElement::new(APPROVE_ACTION_ID, "Approve")
                        .style(ButtonStyle::Primary)
                        .value(requester_id.0.clone()),
                )
                .button(
                    ButtonElement::new(REJECT_ACTION_ID, "Reject")
                        .style(ButtonStyle::Danger)
                        .value(requester_id.0.clone()),
                );
        })
        .build()
}

/// Notification sent to the requester once the approver has decided.
pub fn requester_outcome_message(
    decision: ApprovalDecision,
    approver_id: &UserId,
) -> MessageTemplate {
    let approver = approver_id.mention();
    let text = match decision {
        ApprovalDecision::Approve => format!("✅ Your request was approved by {approver}!"),
        ApprovalDecision::Reject => format!("❌ Your request was rejected by {approver}"),
    };

    MessageBuilder::new(text.clone())
        .section("approval.outcome.requester.v1", |section| {
            section.mrkdwn(text);
        })
        .build()
}

/// Confirmation sent back to the approver, echoing what they decided on.
pub fn approver_confirmation_message(
    decision: ApprovalDecision,
    requester_id: &UserId,
    details: &str,
) -> MessageTemplate {
    let verb = match decision {
        ApprovalDecision::Approve => "approved",
        ApprovalDecision::Reject => "rejected",
    };
    let text = fit_section(format!(
        "You {verb} a request from {}:\n{}",
        requester_id.mention(),
        quote(&escape_mrkdwn(details))
    ));

    MessageBuilder::new(text.clone())
        .section("approval.outcome.approver.v1", |section| {
            section.mrkdwn(text);
        })
        .build()
}

/// Replacement for the approval message when it cannot be deleted. Buttons
/// are dropped so the request cannot be clicked again.
pub fn resolved_request_message(
    decision: ApprovalDecision,
    requester_id: &UserId,
    approver_id: &UserId,
    details: &str,
) -> MessageTemplate {
    let outcome = match decision {
        ApprovalDecision::Approve => "Approved",
        ApprovalDecision::Reject => "Rejected",
    };
    let requester = requester_id.mention();

    MessageBuilder::new(format!("Approval request from {requester}: {outcome}"))
        .section("approval.request.summary.v1", |section| {
            section.mrkdwn(fit_section(format!(
                "*Approval Request*\nFrom: {requester}\n\n{}",
                escape_mrkdwn(details)
            )));
        })
        .context("approval.request.outcome.v1", |context| {
            context.mrkdwn(format!("{outcome} by {}", approver_id.mention()));
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("approval.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("approval.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

/// Escapes the characters Slack reads as mention, link and entity markup,
/// so user text renders literally.
pub fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn quote(text: &str) -> String {
    text.lines().map(|line| format!("> {line}")).collect::<Vec<_>>().join("\n")
}

/// Cuts section text to Slack's limit, marking the cut with an ellipsis.
fn fit_section(text: String) -> String {
    if text.chars().count() <= SECTION_TEXT_LIMIT {
        return text;
    }

    let mut cut: String = text.chars().take(SECTION_TEXT_LIMIT - 1).collect();
    // Never end on half of an `&amp;` style entity.
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut.truncate(amp);
        }
    }
    cut.push('…');
    cut
}
