//! Slack integration for the approval bot.
//!
//! - **Socket Mode** (`socket`, `payload`) - WebSocket connection to Slack, frame decoding, acks
//! - **Web API** (`client`) - `views.open`, `chat.postMessage`, `chat.update`, `chat.delete`
//! - **Slash Commands** (`commands`) - normalizes the command that opens the request form
//! - **Events** (`events`) - typed events and the per-type handler dispatcher
//! - **Workflow** (`workflow`) - request, post, resolve
//! - **Block Kit** (`blocks`) - modal and message builders
//!
//! # Architecture
//!
//! ```text
//! Slack → SocketModeRunner → ack → EventDispatcher → Handlers → ApprovalWorkflow
//!                                                                   ↓        ↓
//!                                                          ApprovalRegistry  SlackApi
//! ```

pub mod blocks;
pub mod client;
pub mod commands;
pub mod events;
pub mod payload;
pub mod socket;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
