//! Error types for the deployment orchestrator

use thiserror::Error;

/// Main error type for the deployment orchestrator
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Cannot connect or authenticate to the remote host
    #[error("SSH session error: {0}")]
    Session(String),

    /// A prerequisite install command exited non-zero
    #[error("Dependency installation failed: {0}")]
    DependencyInstall(String),

    /// Container build, run or id resolution failed
    #[error("Container launch failed: {0}")]
    Launch(String),

    /// Startup could not be confirmed in time. Never fatal.
    #[error("Startup detection timed out: {0}")]
    DetectionTimeout(String),

    /// The tunnel could not be established. Never fatal.
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    /// A record write failed. Logged, never fatal.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<russh::Error> for DeployError {
    fn from(err: russh::Error) -> Self {
        DeployError::Session(err.to_string())
    }
}
