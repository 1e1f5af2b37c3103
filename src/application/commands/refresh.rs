//! Manual refresh: ask the charger to resend its status, metering and
//! configuration.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::{get_configuration, trigger_message, CommandError, SharedCommandSender, TriggerType};
use crate::application::session::SharedSessionRegistry;
use crate::application::state::SharedStateStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshStep {
    pub action: &'static str,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub charge_point_id: Option<String>,
    /// No charger attached; nothing was sent.
    pub skipped: bool,
    pub steps: Vec<RefreshStep>,
}

pub struct RefreshService {
    session_registry: SharedSessionRegistry,
    command_sender: SharedCommandSender,
    state: SharedStateStore,
}

pub type SharedRefreshService = Arc<RefreshService>;

impl RefreshService {
    pub fn new(
        session_registry: SharedSessionRegistry,
        command_sender: SharedCommandSender,
        state: SharedStateStore,
    ) -> Self {
        Self {
            session_registry,
            command_sender,
            state,
        }
    }

    /// Never fails: every step is attempted and its outcome reported.
    pub async fn refresh(&self) -> RefreshReport {
        let Some(charge_point_id) = self.session_registry.current() else {
            warn!("Refresh requested but no charger is connected");
            return RefreshReport {
                charge_point_id: None,
                skipped: true,
                steps: Vec::new(),
            };
        };

        info!(charge_point_id = charge_point_id.as_str(), "Manual refresh");
        let cp = charge_point_id.as_str();
        let sender = &self.command_sender;

        let steps = vec![
            run_step(
                cp,
                "TriggerMessage(StatusNotification)",
                trigger_message(sender, cp, TriggerType::StatusNotification, None),
            )
            .await,
            run_step(
                cp,
                "TriggerMessage(MeterValues)",
                trigger_message(sender, cp, TriggerType::MeterValues, None),
            )
            .await,
            run_step(cp, "GetConfiguration", async {
                let result = get_configuration(sender, cp, None).await?;
                let outcome = self.state.update(|s| {
                    let o = s.apply_configuration(&result.configuration_key);
                    (o.changed, o)
                });
                for (key, error) in &outcome.rejected {
                    warn!(charge_point_id = cp, key = key.as_str(), %error, "Configuration value skipped");
                }
                Ok::<_, CommandError>(format!(
                    "{} keys applied, {} rejected, {} unknown",
                    outcome.applied,
                    outcome.rejected.len(),
                    result.unknown_key.len()
                ))
            })
            .await,
        ];

        RefreshReport {
            charge_point_id: Some(charge_point_id),
            skipped: false,
            steps,
        }
    }
}

async fn run_step(
    charge_point_id: &str,
    action: &'static str,
    step: impl Future<Output = Result<String, CommandError>>,
) -> RefreshStep {
    match step.await {
        Ok(detail) => RefreshStep {
            action,
            ok: true,
            detail,
        },
        Err(error) => {
            warn!(charge_point_id, action, %error, "Refresh step failed");
            RefreshStep {
                action,
                ok: false,
                detail: error.to_string(),
            }
        }
    }
}
