//! Handles of running pipelines, keyed by deployment id

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::DeployError;

#[derive(Debug, Default)]
pub struct PipelineRegistry {
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a pipeline for `deployment_id`.
    ///
    /// Fails with `InvalidState` while another pipeline for the same id is
    /// still running.
    pub fn spawn<F>(&self, deployment_id: &str, pipeline: F) -> Result<(), DeployError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut handles = self.lock()?;
        handles.retain(|_, handle| !handle.is_finished());

        if handles.contains_key(deployment_id) {
            return Err(DeployError::InvalidState(format!(
                "Deployment {} already has a running pipeline",
                deployment_id
            )));
        }

        debug!("Spawning pipeline for deployment {}", deployment_id);
        handles.insert(deployment_id.to_string(), tokio::spawn(pipeline));
        Ok(())
    }

    /// Ids of pipelines that have not finished yet
    pub fn active(&self) -> Vec<String> {
        let Ok(handles) = self.lock() else {
            return Vec::new();
        };
        let mut ids: Vec<_> = handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Abort every pipeline. Used at process shutdown.
    pub fn abort_all(&self) {
        let Ok(mut handles) = self.lock() else {
            return;
        };
        for (id, handle) in handles.drain() {
            if !handle.is_finished() {
                info!("Aborting pipeline for deployment {}", id);
                handle.abort();
            }
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>>, DeployError> {
        self.handles
            .lock()
            .map_err(|e| DeployError::Internal(format!("Pipeline registry lock poisoned: {}", e)))
    }
}
