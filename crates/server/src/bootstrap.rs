use std::sync::Arc;

use signoff_core::config::{AppConfig, ConfigError};
use signoff_core::ApprovalRegistry;
use signoff_slack::{
    client::{SlackApiError, SlackWebClient},
    events::approval_dispatcher,
    socket::{ReconnectPolicy, SocketModeRunner, WebSocketTransport},
    workflow::ApprovalWorkflow,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<ApprovalRegistry>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack client setup failed: {0}")]
    SlackClient(#[source] SlackApiError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let client =
        Arc::new(SlackWebClient::from_config(&config.slack).map_err(BootstrapError::SlackClient)?);
    info!(
        event_name = "system.bootstrap.slack_client_ready",
        correlation_id = "bootstrap",
        api_base_url = %config.slack.api_base_url,
        "slack web client configured"
    );

    let registry = Arc::new(ApprovalRegistry::new());
    let workflow = Arc::new(ApprovalWorkflow::new(client.clone(), registry.clone()));
    let dispatcher = approval_dispatcher(workflow, config.slack.command.clone());
    info!(
        event_name = "system.bootstrap.dispatcher_ready",
        correlation_id = "bootstrap",
        command = %config.slack.command,
        handler_count = dispatcher.handler_count(),
        "approval handlers registered"
    );

    let transport = Arc::new(WebSocketTransport::new(client));
    let slack_runner = SocketModeRunner::new(transport, dispatcher, ReconnectPolicy::default());

    Ok(Application { config, registry, slack_runner })
}
