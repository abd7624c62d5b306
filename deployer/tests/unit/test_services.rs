//! Deployment service tests

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use modeldeploy::deploy::fsm::DeploymentStatus;
use modeldeploy::deploy::pipeline::{Options, Pipeline};
use modeldeploy::deploy::registry::PipelineRegistry;
use modeldeploy::errors::DeployError;
use modeldeploy::models::deployment::{Deployment, DEPLOYMENTS, MONITOR};
use modeldeploy::services::DeploymentService;
use modeldeploy::store::{to_document, DocumentStore, MemoryStore};

use crate::support::{request, ScriptedConnector};

struct Fixture {
    store: Arc<MemoryStore>,
    registry: Arc<PipelineRegistry>,
    service: DeploymentService,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(PipelineRegistry::new());
    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        Arc::new(ScriptedConnector::refusing()),
        Options::default(),
    ));
    let service = DeploymentService::new(
        store.clone(),
        pipeline,
        registry.clone(),
        "https://deploy.example.com/",
    );
    Fixture {
        store,
        registry,
        service,
    }
}

async fn seed(store: &MemoryStore, id: &str, user_id: &str, status: DeploymentStatus, day: u32) {
    let mut deployment = Deployment::queued(id, &request("My Api"));
    deployment.user_id = user_id.to_string();
    deployment.status = status;
    deployment.created_at = Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap();
    store
        .set(DEPLOYMENTS, id, to_document(&deployment).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_records_deployment_and_monitor() {
    let fx = fixture();

    let created = fx.service.create(request("My Api")).await.unwrap();
    let id = created.deployment_id.clone();

    assert_eq!(created.status, DeploymentStatus::Queued);
    assert_eq!(
        created.monitor_url,
        format!("https://deploy.example.com/api/v1/deployments/{}/status", id)
    );
    let monitor = fx.store.get(MONITOR, &id).await.unwrap().unwrap();
    assert_eq!(monitor["isPolling"], true);
    assert_eq!(monitor["monitorUrl"], created.monitor_url.as_str());

    // The refused connection fails the background pipeline
    for _ in 0..200 {
        if fx.registry.active().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let status = fx.service.status(&id).await.unwrap();
    assert_eq!(status.status, DeploymentStatus::Failed);
    assert_eq!(status.progress, -1);
    assert!(status.error.unwrap().starts_with("Deployment failed: "));
}

#[tokio::test]
async fn test_missing_deployment_is_not_found() {
    let fx = fixture();

    assert!(matches!(
        fx.service.get("nope").await,
        Err(DeployError::NotFound(_))
    ));
    assert!(matches!(
        fx.service.status("nope").await,
        Err(DeployError::NotFound(_))
    ));
    assert!(matches!(
        fx.service.stop("nope").await,
        Err(DeployError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_stop_and_delete_only_from_active() {
    let fx = fixture();
    seed(&fx.store, "live", "user-1", DeploymentStatus::Active, 1).await;
    seed(&fx.store, "early", "user-1", DeploymentStatus::Deploying, 2).await;

    let err = fx.service.stop("early").await.unwrap_err();
    match err {
        DeployError::InvalidState(message) => {
            assert_eq!(message, "Cannot stop deployment in 'deploying' status")
        }
        other => panic!("unexpected error: {other}"),
    }

    let change = fx.service.stop("live").await.unwrap();
    assert_eq!(change.status, DeploymentStatus::Stopped);
    let record = fx.service.get("live").await.unwrap();
    assert_eq!(record["status"], "stopped");
    assert!(record.get("stoppedAt").is_some());

    let err = fx.service.delete("live").await.unwrap_err();
    match err {
        DeployError::InvalidState(message) => {
            assert_eq!(message, "Cannot delete deployment in 'stopped' status")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_delete_keeps_record() {
    let fx = fixture();
    seed(&fx.store, "live", "user-1", DeploymentStatus::Active, 1).await;

    fx.service.delete("live").await.unwrap();

    let record = fx.service.get("live").await.unwrap();
    assert_eq!(record["status"], "deleted");
    assert!(record.get("deletedAt").is_some());
}

#[tokio::test]
async fn test_list_newest_first_with_filter_and_limit() {
    let fx = fixture();
    seed(&fx.store, "a", "user-1", DeploymentStatus::Active, 1).await;
    seed(&fx.store, "b", "user-2", DeploymentStatus::Failed, 2).await;
    seed(&fx.store, "c", "user-1", DeploymentStatus::Queued, 3).await;
    seed(&fx.store, "d", "user-1", DeploymentStatus::Stopped, 4).await;

    let ids = |docs: Vec<modeldeploy::store::Document>| -> Vec<String> {
        docs.iter()
            .map(|doc| doc["deploymentId"].as_str().unwrap().to_string())
            .collect()
    };

    let all = fx.service.list(None, 10).await.unwrap();
    assert_eq!(ids(all), vec!["d", "c", "b", "a"]);

    let mine = fx.service.list(Some("user-1"), 2).await.unwrap();
    assert_eq!(ids(mine), vec!["d", "c"]);
}
