//! Deployment models

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentStatus;
use crate::models::endpoints::EndpointSet;

/// Port the serving engine listens on inside the container
pub const CONTAINER_PORT: u16 = 2242;

/// Collection holding deployment records
pub const DEPLOYMENTS: &str = "deployments";

/// Collection holding monitor records
pub const MONITOR: &str = "monitor";

/// Remote host access parameters
#[derive(Debug, Deserialize)]
pub struct SshConfig {
    pub host: String,

    pub username: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Password, also used for `sudo -S` elevation
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Path to a private key on this machine. Takes precedence over the password for login.
    #[serde(default)]
    pub key_file: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl SshConfig {
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose_secret())
    }
}

/// A request to provision one model-serving container
#[derive(Debug, Deserialize)]
pub struct DeploymentRequest {
    pub model_id: String,

    pub user_id: String,

    pub api_name: String,

    pub ssh_config: SshConfig,

    /// Explicit host port. Derived from the deployment id when absent.
    #[serde(default)]
    pub host_port: Option<u16>,

    #[serde(default = "default_true")]
    pub auto_restart: bool,

    #[serde(default)]
    pub huggingface_token: Option<SecretString>,
}

fn default_true() -> bool {
    true
}

/// Container details recorded once a deployment is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDetails {
    pub id: String,
    pub model: String,
    pub host_port: u16,
    pub container_port: u16,
    pub image: String,
    pub container_name: String,
    pub deployment_id: String,
}

/// A persisted deployment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub deployment_id: String,

    pub user_id: String,

    pub model_id: String,

    pub api_name: String,

    pub status: DeploymentStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_endpoints: Option<EndpointSet>,

    /// Publicly mapped endpoints, present once active
    #[serde(default, rename = "endpoints", skip_serializing_if = "Option::is_none")]
    pub mapped_endpoints: Option<EndpointSet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_details: Option<ContainerDetails>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_completed: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    /// Seconds from pipeline start to its terminal write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_duration: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Deployment {
    /// A fresh record in queued state
    pub fn queued(deployment_id: &str, request: &DeploymentRequest) -> Self {
        Self {
            deployment_id: deployment_id.to_string(),
            user_id: request.user_id.clone(),
            model_id: request.model_id.clone(),
            api_name: request.api_name.clone(),
            status: DeploymentStatus::Queued,
            host_port: None,
            machine_id: None,
            container_id: None,
            container_status: None,
            tunnel_url: None,
            local_endpoints: None,
            mapped_endpoints: None,
            container_details: None,
            created_at: Utc::now(),
            updated_at: None,
            deployment_completed: None,
            failed_at: None,
            stopped_at: None,
            deleted_at: None,
            deployment_duration: None,
            error: None,
        }
    }
}

/// Response to a create-deployment request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentCreated {
    pub deployment_id: String,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub monitor_url: String,
}

/// Status view returned by the status endpoint and consumed by the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub deployment_id: String,

    pub status: DeploymentStatus,

    pub progress: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,

    #[serde(default)]
    pub model_id: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub host_port: Option<u16>,

    #[serde(default)]
    pub container_id: Option<String>,

    #[serde(default)]
    pub machine_id: Option<String>,

    #[serde(default)]
    pub tunnel_url: Option<String>,

    #[serde(default)]
    pub endpoints: Option<EndpointSet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_completed: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_duration: Option<f64>,
}

impl From<&Deployment> for StatusView {
    fn from(deployment: &Deployment) -> Self {
        let status = deployment.status;
        let failed = status == DeploymentStatus::Failed;
        let active = status == DeploymentStatus::Active;

        Self {
            deployment_id: deployment.deployment_id.clone(),
            status,
            progress: status.progress(),
            estimated_time: status.estimated_time().map(str::to_string),
            model_id: Some(deployment.model_id.clone()),
            created_at: Some(deployment.created_at),
            host_port: deployment.host_port,
            container_id: deployment.container_id.clone(),
            machine_id: deployment.machine_id.clone(),
            tunnel_url: deployment.tunnel_url.clone(),
            endpoints: deployment.mapped_endpoints.clone(),
            error: deployment.error.clone().filter(|_| failed),
            failed_at: deployment.failed_at.filter(|_| failed),
            deployment_completed: deployment.deployment_completed.filter(|_| active),
            deployment_duration: deployment.deployment_duration.filter(|_| active),
        }
    }
}
