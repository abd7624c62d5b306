//! Server state

use std::sync::Arc;

use crate::services::{DeploymentService, Monitor};

/// Server state shared across handlers
pub struct ServerState {
    pub deployments: Arc<DeploymentService>,
    pub monitor: Arc<Monitor>,
}

impl ServerState {
    pub fn new(deployments: Arc<DeploymentService>, monitor: Arc<Monitor>) -> Self {
        Self {
            deployments,
            monitor,
        }
    }
}
