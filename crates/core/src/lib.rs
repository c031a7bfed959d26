pub mod config;
pub mod domain;
pub mod errors;
pub mod registry;

pub use domain::approval::{
    ApprovalDecision, ApprovalRecord, ApprovalStatus, ChannelId, MessageId, UserId,
};
pub use errors::{DomainError, InterfaceError};
pub use registry::ApprovalRegistry;
