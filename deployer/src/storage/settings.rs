//! Settings file management

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for daily rolling log files. Stdout only when absent.
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// JSON snapshot file for the record store. In-memory when absent.
    #[serde(default)]
    pub store_path: Option<String>,

    /// Enable the monitor worker
    #[serde(default = "default_true")]
    pub enable_monitor: bool,

    /// Monitor interval in seconds
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Timeout for outbound status requests in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Provisioning configuration
    #[serde(default)]
    pub provisioning: ProvisioningSettings,
}

fn default_true() -> bool {
    true
}

fn default_monitor_interval() -> u64 {
    5
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: None,
            log_json: false,
            server: ServerSettings::default(),
            store_path: None,
            enable_monitor: true,
            monitor_interval_secs: default_monitor_interval(),
            http_timeout_secs: default_http_timeout(),
            provisioning: ProvisioningSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not exist
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            info!("No settings file at {}, using defaults", file.path().display());
            return Ok(Self::default());
        }
        file.read_json().await.map_err(|e| {
            DeployError::ConfigError(format!(
                "Invalid settings file {}: {}",
                file.path().display(),
                e
            ))
        })
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, used in monitor URLs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_public_base_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: default_public_base_url(),
        }
    }
}

/// Remote provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Upper bound on following container logs in seconds
    #[serde(default = "default_detector_timeout")]
    pub detector_timeout_secs: u64,

    /// Subdomain launches before falling back
    #[serde(default = "default_tunnel_attempts")]
    pub tunnel_attempts: u32,

    #[serde(default = "default_tunnel_settle")]
    pub tunnel_settle_secs: u64,

    #[serde(default = "default_tunnel_retry")]
    pub tunnel_retry_secs: u64,

    /// Pause after each package install in seconds
    #[serde(default = "default_install_settle")]
    pub install_settle_secs: u64,
}

fn default_detector_timeout() -> u64 {
    600
}

fn default_tunnel_attempts() -> u32 {
    3
}

fn default_tunnel_settle() -> u64 {
    5
}

fn default_tunnel_retry() -> u64 {
    2
}

fn default_install_settle() -> u64 {
    2
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            detector_timeout_secs: default_detector_timeout(),
            tunnel_attempts: default_tunnel_attempts(),
            tunnel_settle_secs: default_tunnel_settle(),
            tunnel_retry_secs: default_tunnel_retry(),
            install_settle_secs: default_install_settle(),
        }
    }
}
