//! Finite State Machine for deployment lifecycle

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Record created, pipeline not yet started
    Queued,

    /// Connecting, installing prerequisites, launching the container
    Deploying,

    /// Container launched, waiting for it to serve
    Starting,

    /// Serving
    Active,

    /// Pipeline aborted
    Failed,

    /// Stopped by an operator
    Stopped,

    /// Deleted by an operator
    Deleted,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Starting => "starting",
            DeploymentStatus::Active => "active",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Stopped => "stopped",
            DeploymentStatus::Deleted => "deleted",
        }
    }

    /// No pipeline-driven transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Active
                | DeploymentStatus::Failed
                | DeploymentStatus::Stopped
                | DeploymentStatus::Deleted
        )
    }

    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, next),
            (Queued, Deploying)
                | (Deploying, Starting)
                | (Starting, Active)
                | (Queued | Deploying | Starting, Failed)
                | (Active, Stopped)
                | (Active, Deleted)
        )
    }

    /// Coarse progress estimate reported to clients
    pub fn progress(&self) -> i32 {
        match self {
            DeploymentStatus::Queued => 5,
            DeploymentStatus::Deploying => 15,
            DeploymentStatus::Starting => 50,
            DeploymentStatus::Active => 100,
            DeploymentStatus::Failed => -1,
            DeploymentStatus::Stopped | DeploymentStatus::Deleted => 0,
        }
    }

    pub fn estimated_time(&self) -> Option<&'static str> {
        match self {
            DeploymentStatus::Queued => Some("5-10 minutes"),
            DeploymentStatus::Deploying => Some("4-8 minutes"),
            DeploymentStatus::Starting => Some("1-3 minutes"),
            _ => None,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DeploymentStatus::Queued),
            "deploying" => Ok(DeploymentStatus::Deploying),
            "starting" => Ok(DeploymentStatus::Starting),
            "active" => Ok(DeploymentStatus::Active),
            "failed" => Ok(DeploymentStatus::Failed),
            "stopped" => Ok(DeploymentStatus::Stopped),
            "deleted" => Ok(DeploymentStatus::Deleted),
            _ => Err(DeployError::InvalidState(format!("Unknown status: {}", s))),
        }
    }
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    status: DeploymentStatus,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in queued state
    pub fn new() -> Self {
        Self::from_status(DeploymentStatus::Queued)
    }

    /// Resume tracking a persisted status
    pub fn from_status(status: DeploymentStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    /// Get current status
    pub fn status(&self) -> DeploymentStatus {
        self.status
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Move to `next`, rejecting edges outside the lifecycle graph
    pub fn transition(&mut self, next: DeploymentStatus) -> Result<(), DeployError> {
        if !self.status.can_transition_to(next) {
            return Err(DeployError::InvalidState(format!(
                "Invalid transition: {} -> {}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Move to failed with the given error message
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), DeployError> {
        self.transition(DeploymentStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
