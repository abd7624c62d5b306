//! Polling deployment status endpoints into monitor records

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::DeployError;
use crate::http::{ProbeOutcome, StatusProbe};
use crate::models::deployment::{StatusView, MONITOR};
use crate::store::{fields, Document, DocumentStore, Query};

static MONITOR_PATH: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"/deployments/([^/]+)/status").expect("valid regex")
});

/// Checks every polling monitor record once per tick
pub struct Monitor {
    store: Arc<dyn DocumentStore>,
    probe: Arc<dyn StatusProbe>,
}

impl Monitor {
    pub fn new(store: Arc<dyn DocumentStore>, probe: Arc<dyn StatusProbe>) -> Self {
        Self { store, probe }
    }

    /// Check all polling records concurrently and wait for every check.
    ///
    /// Returns the number of records checked.
    pub async fn tick(&self) -> Result<usize, DeployError> {
        let pending = self
            .store
            .query(MONITOR, &Query::new().where_eq("isPolling", true))
            .await?;

        if pending.is_empty() {
            debug!("No deployments to monitor");
            return Ok(0);
        }

        let count = pending.len();
        info!("Found {} deployments to monitor", count);
        join_all(pending.into_iter().map(|(id, record)| self.check(id, record))).await;
        debug!("Deployment monitoring completed");
        Ok(count)
    }

    async fn check(&self, deployment_id: String, record: Document) {
        let update = self.evaluate(&deployment_id, &record).await;
        if let Err(e) = self.store.update(MONITOR, &deployment_id, update).await {
            error!(
                "{}",
                DeployError::Persistence(format!("monitor record {}: {}", deployment_id, e))
            );
        }
    }

    /// Fields to write back to one monitor record
    async fn evaluate(&self, deployment_id: &str, record: &Document) -> Document {
        let now = Utc::now();

        let Some(monitor_url) = record
            .get("monitorUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
        else {
            error!("Missing monitor URL for deployment {}", deployment_id);
            return fields(json!({
                "isPolling": false,
                "errorMessage": "Missing monitor URL",
                "updatedAt": now,
            }));
        };

        if !MONITOR_PATH.is_match(monitor_url) {
            error!("Invalid monitor URL format: {}", monitor_url);
            return fields(json!({
                "isPolling": false,
                "errorMessage": "Invalid monitor URL format",
                "updatedAt": now,
            }));
        }

        debug!("Requesting status from: {}", monitor_url);
        match self.probe.fetch_status(monitor_url).await {
            Ok(ProbeOutcome::Report(view)) => {
                info!("Received status for deployment {}: {}", deployment_id, view.status);
                report_update(deployment_id, record, &view, now)
            }
            Ok(ProbeOutcome::HttpStatus(code)) => {
                error!("Error response {} for deployment {}", code, deployment_id);
                fields(json!({
                    "lastErrorMessage": format!("HTTP Error: {}", code),
                    "updatedAt": now,
                }))
            }
            Err(e) => {
                warn!("Error monitoring deployment {}: {}", deployment_id, e);
                fields(json!({
                    "lastErrorMessage": e.to_string(),
                    "updatedAt": now,
                }))
            }
        }
    }
}

fn report_update(
    deployment_id: &str,
    record: &Document,
    view: &StatusView,
    now: DateTime<Utc>,
) -> Document {
    let current = record
        .get("status")
        .and_then(Value::as_str)
        .and_then(|status| status.parse::<DeploymentStatus>().ok());
    if let Some(current) = current {
        if current.is_terminal() && !view.status.is_terminal() {
            warn!(
                "Deployment {} reported {} after {}, keeping {}",
                deployment_id, view.status, current, current
            );
            return fields(json!({"updatedAt": now}));
        }
    }

    let mut update = fields(json!({
        "status": view.status,
        "progress": view.progress,
        "updatedAt": now,
    }));
    if let Some(tunnel_url) = &view.tunnel_url {
        update.insert("tunnelUrl".to_string(), json!(tunnel_url));
    }
    if let Some(endpoints) = &view.endpoints {
        update.insert("endpoints".to_string(), json!(endpoints));
    }

    match view.status {
        DeploymentStatus::Active => {
            if let Some(completed) = view.deployment_completed {
                update.insert("deploymentCompleted".to_string(), json!(completed));
            }
            if let Some(duration) = view.deployment_duration {
                update.insert("deploymentDuration".to_string(), json!(duration));
            }
            update.insert("isPolling".to_string(), json!(false));
        }
        DeploymentStatus::Failed => {
            let message = view.error.as_deref().unwrap_or("Deployment failed");
            update.insert("errorMessage".to_string(), json!(message));
            update.insert("isPolling".to_string(), json!(false));
        }
        DeploymentStatus::Stopped | DeploymentStatus::Deleted => {
            update.insert("isPolling".to_string(), json!(false));
        }
        _ => {}
    }
    update
}
