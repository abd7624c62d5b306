//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::{deps, detector, pipeline, tunnel};
use crate::http::client;
use crate::remote::ssh;
use crate::storage::settings::Settings;
use crate::workers::monitor;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Record store snapshot file. In-memory store when absent.
    pub store_path: Option<PathBuf>,

    /// Enable the HTTP server
    pub enable_server: bool,

    /// Enable the monitor worker
    pub enable_monitor: bool,

    /// Monitor worker options
    pub monitor: monitor::Options,

    /// Status probe client options
    pub http_client: client::Options,

    /// SSH client options
    pub ssh: ssh::Options,

    /// Provisioning pipeline options
    pub pipeline: pipeline::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            store_path: None,
            enable_server: true,
            enable_monitor: true,
            monitor: monitor::Options::default(),
            http_client: client::Options::default(),
            ssh: ssh::Options::default(),
            pipeline: pipeline::Options::default(),
        }
    }
}

impl AppOptions {
    /// Build options from a settings file
    pub fn from_settings(settings: &Settings) -> Self {
        let provisioning = &settings.provisioning;
        let dependencies = deps::Options {
            settle_delay: Duration::from_secs(provisioning.install_settle_secs),
        };

        Self {
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
                public_base_url: settings.server.public_base_url.clone(),
            },
            store_path: settings.store_path.as_ref().map(PathBuf::from),
            enable_monitor: settings.enable_monitor,
            monitor: monitor::Options {
                interval: Duration::from_secs(settings.monitor_interval_secs),
            },
            http_client: client::Options {
                base_url: settings.server.public_base_url.clone(),
                timeout: Duration::from_secs(settings.http_timeout_secs),
            },
            pipeline: pipeline::Options {
                dependencies: dependencies.clone(),
                detector: detector::Options {
                    timeout: Duration::from_secs(provisioning.detector_timeout_secs),
                },
                tunnel: tunnel::Options {
                    attempts: provisioning.tunnel_attempts,
                    settle_delay: Duration::from_secs(provisioning.tunnel_settle_secs),
                    retry_delay: Duration::from_secs(provisioning.tunnel_retry_secs),
                    dependencies,
                    ..Default::default()
                },
            },
            ..Default::default()
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Externally reachable base URL, used in monitor URLs
    pub public_base_url: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_base_url: "http://localhost:8000".to_string(),
        }
    }
}
