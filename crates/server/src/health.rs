use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use signoff_core::ApprovalRegistry;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    registry: Arc<ApprovalRegistry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub pending_approvals: usize,
    pub checked_at: String,
}

pub fn router(registry: Arc<ApprovalRegistry>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { registry })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    registry: Arc<ApprovalRegistry>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(registry)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "signoff-server runtime initialized".to_string(),
        },
        pending_approvals: state.registry.len().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use signoff_core::{ApprovalRecord, ApprovalRegistry, ChannelId, MessageId, UserId};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_reports_ready_with_no_pending_approvals() {
        let registry = Arc::new(ApprovalRegistry::new());

        let (status, Json(payload)) = health(State(HealthState { registry })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.service.status, "ready");
        assert_eq!(payload.pending_approvals, 0);
    }

    #[tokio::test]
    async fn health_counts_pending_approvals() {
        let registry = Arc::new(ApprovalRegistry::new());
        for ts in ["1.0001", "1.0002"] {
            registry
                .put(ApprovalRecord::pending(
                    MessageId(ts.to_string()),
                    ChannelId("D2".to_string()),
                    UserId("U1".to_string()),
                    UserId("U2".to_string()),
                    "Need budget sign-off",
                ))
                .await;
        }

        let (_, Json(payload)) = health(State(HealthState { registry: registry.clone() })).await;
        assert_eq!(payload.pending_approvals, 2);

        registry.remove(&MessageId("1.0001".to_string())).await;
        let (_, Json(payload)) = health(State(HealthState { registry })).await;
        assert_eq!(payload.pending_approvals, 1);
    }
}
