use thiserror::Error;

use crate::domain::approval::ApprovalStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid approval transition from {from:?} to {to:?}")]
    InvalidApprovalTransition { from: ApprovalStatus, to: ApprovalStatus },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "Slack is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}

impl DomainError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        match self {
            Self::InvalidApprovalTransition { .. } => InterfaceError::BadRequest {
                message: self.to_string(),
                correlation_id: correlation_id.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::approval::ApprovalStatus;
    use crate::errors::{DomainError, InterfaceError};

    #[test]
    fn invalid_transition_maps_to_bad_request() {
        let interface = DomainError::InvalidApprovalTransition {
            from: ApprovalStatus::Approved,
            to: ApprovalStatus::Rejected,
        }
        .into_interface("env-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "env-1"
        ));
        assert_eq!(interface.correlation_id(), "env-1");
    }

    #[test]
    fn bad_request_has_user_safe_message() {
        let interface = DomainError::InvalidApprovalTransition {
            from: ApprovalStatus::Approved,
            to: ApprovalStatus::Rejected,
        }
        .into_interface("env-2");

        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }
}
