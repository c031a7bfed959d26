use serde::Serialize;
use signoff_core::config::{AppConfig, LoadOptions};
use signoff_slack::client::{SlackApi, SlackWebClient};

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::report(exit_code, output);
    }

    CommandResult::report(exit_code, render_human(&report))
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(check_slack(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped(
                "slack_bot_token",
                "configuration did not load",
            ));
            checks.push(DoctorCheck::skipped(
                "slack_app_token",
                "configuration did not load",
            ));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Calls `auth.test` with the bot token and `apps.connections.open` with the
/// app token. Opening a connection URL does not connect to it.
fn check_slack(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return vec![
                DoctorCheck { name: "slack_bot_token", status: CheckStatus::Fail, details },
                DoctorCheck::skipped("slack_app_token", "the async runtime did not start"),
            ];
        }
    };

    let client = match SlackWebClient::from_config(&config.slack) {
        Ok(client) => client,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "slack_bot_token",
                    status: CheckStatus::Fail,
                    details: error.to_string(),
                },
                DoctorCheck::skipped("slack_app_token", "the slack client could not be built"),
            ];
        }
    };

    runtime.block_on(async {
        let bot = match client.auth_test().await {
            Ok(identity) => DoctorCheck {
                name: "slack_bot_token",
                status: CheckStatus::Pass,
                details: format!(
                    "auth.test succeeded as {} in team {}",
                    identity.user_id, identity.team
                ),
            },
            Err(error) => DoctorCheck {
                name: "slack_bot_token",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        };

        let app = match client.open_socket_connection().await {
            Ok(_) => DoctorCheck {
                name: "slack_app_token",
                status: CheckStatus::Pass,
                details: "apps.connections.open issued a socket mode url".to_string(),
            },
            Err(error) => DoctorCheck {
                name: "slack_app_token",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        };

        vec![bot, app]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
