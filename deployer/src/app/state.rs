//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::pipeline::Pipeline;
use crate::deploy::registry::PipelineRegistry;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::http::StatusProbe;
use crate::remote::SessionConnector;
use crate::services::{DeploymentService, Monitor};
use crate::store::{DocumentStore, FileStore, MemoryStore};

/// Main application state
pub struct AppState {
    /// Deployment and monitor records
    pub store: Arc<dyn DocumentStore>,

    /// Running pipelines
    pub registry: Arc<PipelineRegistry>,

    /// Deployment operations
    pub deployments: Arc<DeploymentService>,

    /// Monitor scheduler
    pub monitor: Arc<Monitor>,
}

impl AppState {
    /// Open the configured store and wire the services around it
    pub async fn init(
        options: &AppOptions,
        connector: Arc<dyn SessionConnector>,
        probe: Arc<dyn StatusProbe>,
    ) -> Result<Self, DeployError> {
        info!("Initializing application state...");

        let store: Arc<dyn DocumentStore> = match &options.store_path {
            Some(path) => {
                info!("Using file store at {}", path.display());
                Arc::new(FileStore::open(File::new(path)).await?)
            }
            None => {
                info!("Using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::new(options, store, connector, probe))
    }

    pub fn new(
        options: &AppOptions,
        store: Arc<dyn DocumentStore>,
        connector: Arc<dyn SessionConnector>,
        probe: Arc<dyn StatusProbe>,
    ) -> Self {
        let registry = Arc::new(PipelineRegistry::new());
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            connector,
            options.pipeline.clone(),
        ));
        let deployments = Arc::new(DeploymentService::new(
            store.clone(),
            pipeline,
            registry.clone(),
            &options.server.public_base_url,
        ));
        let monitor = Arc::new(Monitor::new(store.clone(), probe));

        Self {
            store,
            registry,
            deployments,
            monitor,
        }
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), DeployError> {
        info!("Shutting down application state...");
        self.registry.abort_all();
        Ok(())
    }
}
