//! Monitor record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentStatus;

/// A deployment tracked by the monitor scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorRecord {
    pub deployment_id: String,

    #[serde(default)]
    pub model_id: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    /// Status endpoint polled on every tick
    #[serde(default)]
    pub monitor_url: Option<String>,

    pub is_polling: bool,

    #[serde(default)]
    pub status: Option<DeploymentStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MonitorRecord {
    pub fn new(deployment_id: &str, model_id: &str, user_id: &str, monitor_url: String) -> Self {
        Self {
            deployment_id: deployment_id.to_string(),
            model_id: Some(model_id.to_string()),
            user_id: Some(user_id.to_string()),
            monitor_url: Some(monitor_url),
            is_polling: true,
            status: Some(DeploymentStatus::Queued),
            progress: None,
            error_message: None,
            last_error_message: None,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }
}
