//! Pipeline registry tests

use std::time::Duration;

use modeldeploy::deploy::registry::PipelineRegistry;
use modeldeploy::errors::DeployError;

#[tokio::test]
async fn test_duplicate_running_pipeline_is_rejected() {
    let registry = PipelineRegistry::new();
    registry
        .spawn("dep-1", futures::future::pending::<()>())
        .unwrap();

    let err = registry
        .spawn("dep-1", futures::future::pending::<()>())
        .unwrap_err();
    assert!(matches!(err, DeployError::InvalidState(_)));

    registry.spawn("dep-2", async {}).unwrap();
    registry.abort_all();
    assert!(registry.active().is_empty());
}

#[tokio::test]
async fn test_finished_pipeline_can_be_replaced() {
    let registry = PipelineRegistry::new();
    registry.spawn("dep-1", async {}).unwrap();

    for _ in 0..200 {
        if registry.active().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(registry.active().is_empty());

    registry
        .spawn("dep-1", futures::future::pending::<()>())
        .unwrap();
    assert_eq!(registry.active(), vec!["dep-1".to_string()]);
    registry.abort_all();
}
