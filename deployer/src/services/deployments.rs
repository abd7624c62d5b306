//! Deployment request handling

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::deploy::fsm::{DeploymentFsm, DeploymentStatus};
use crate::deploy::pipeline::Pipeline;
use crate::deploy::registry::PipelineRegistry;
use crate::errors::DeployError;
use crate::models::deployment::{
    Deployment, DeploymentCreated, DeploymentRequest, StatusView, DEPLOYMENTS, MONITOR,
};
use crate::models::monitor::MonitorRecord;
use crate::store::{fields, from_document, to_document, Direction, Document, DocumentStore, Query};
use crate::utils::generate_uuid;

/// Default page size for listing deployments
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Result of an operator status change
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub deployment_id: String,
    pub status: DeploymentStatus,
    pub message: String,
}

pub struct DeploymentService {
    store: Arc<dyn DocumentStore>,
    pipeline: Arc<Pipeline>,
    registry: Arc<PipelineRegistry>,
    public_base_url: String,
}

impl DeploymentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        pipeline: Arc<Pipeline>,
        registry: Arc<PipelineRegistry>,
        public_base_url: &str,
    ) -> Self {
        Self {
            store,
            pipeline,
            registry,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Status URL polled by the monitor for a deployment
    pub fn monitor_url(&self, deployment_id: &str) -> String {
        format!(
            "{}/api/v1/deployments/{}/status",
            self.public_base_url, deployment_id
        )
    }

    /// Record a new deployment and start provisioning it in the background
    pub async fn create(&self, request: DeploymentRequest) -> Result<DeploymentCreated, DeployError> {
        let deployment_id = generate_uuid();
        let deployment = Deployment::queued(&deployment_id, &request);
        self.store
            .set(DEPLOYMENTS, &deployment_id, to_document(&deployment)?)
            .await?;

        let monitor_url = self.monitor_url(&deployment_id);
        let record = MonitorRecord::new(
            &deployment_id,
            &request.model_id,
            &request.user_id,
            monitor_url.clone(),
        );
        self.store
            .set(MONITOR, &deployment_id, to_document(&record)?)
            .await?;

        info!(
            "Queued deployment {} of model {} for user {}",
            deployment_id, request.model_id, request.user_id
        );

        let pipeline = self.pipeline.clone();
        let id = deployment_id.clone();
        self.registry.spawn(&deployment_id, async move {
            pipeline.run(&id, request).await;
        })?;

        Ok(DeploymentCreated {
            deployment_id,
            status: DeploymentStatus::Queued,
            created_at: deployment.created_at,
            monitor_url,
        })
    }

    /// Raw deployment record
    pub async fn get(&self, deployment_id: &str) -> Result<Document, DeployError> {
        self.store
            .get(DEPLOYMENTS, deployment_id)
            .await?
            .ok_or_else(|| DeployError::NotFound("Deployment not found".to_string()))
    }

    pub async fn status(&self, deployment_id: &str) -> Result<StatusView, DeployError> {
        let deployment = self.load(deployment_id).await?;
        Ok(StatusView::from(&deployment))
    }

    /// Deployments, newest first, optionally for one user
    pub async fn list(&self, user_id: Option<&str>, limit: usize) -> Result<Vec<Document>, DeployError> {
        let mut query = Query::new();
        if let Some(user_id) = user_id {
            query = query.where_eq("userId", user_id);
        }
        let query = query.order_by("createdAt", Direction::Descending).limit(limit);

        let docs = self.store.query(DEPLOYMENTS, &query).await?;
        Ok(docs.into_iter().map(|(_, doc)| doc).collect())
    }

    /// Mark an active deployment stopped. Remote resources are left running.
    pub async fn stop(&self, deployment_id: &str) -> Result<StatusChange, DeployError> {
        self.change_status(deployment_id, DeploymentStatus::Stopped, "stoppedAt")
            .await
    }

    /// Mark an active deployment deleted. The record is kept.
    pub async fn delete(&self, deployment_id: &str) -> Result<StatusChange, DeployError> {
        self.change_status(deployment_id, DeploymentStatus::Deleted, "deletedAt")
            .await
    }

    async fn change_status(
        &self,
        deployment_id: &str,
        next: DeploymentStatus,
        timestamp_field: &str,
    ) -> Result<StatusChange, DeployError> {
        let deployment = self.load(deployment_id).await?;

        let mut fsm = DeploymentFsm::from_status(deployment.status);
        fsm.transition(next).map_err(|_| {
            DeployError::InvalidState(format!(
                "Cannot {} deployment in '{}' status",
                verb(next),
                deployment.status
            ))
        })?;

        let now = Utc::now();
        let mut doc = fields(json!({"status": next, "updatedAt": now}));
        doc.insert(timestamp_field.to_string(), json!(now));
        self.store.update(DEPLOYMENTS, deployment_id, doc).await?;

        info!("Deployment {} marked as {}", deployment_id, next);
        Ok(StatusChange {
            deployment_id: deployment_id.to_string(),
            status: next,
            message: format!("Deployment marked as {}", next),
        })
    }

    async fn load(&self, deployment_id: &str) -> Result<Deployment, DeployError> {
        from_document(self.get(deployment_id).await?)
    }
}

fn verb(status: DeploymentStatus) -> &'static str {
    match status {
        DeploymentStatus::Deleted => "delete",
        _ => "stop",
    }
}
