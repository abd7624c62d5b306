//! Monitor worker tests

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use modeldeploy::http::ProbeOutcome;
use modeldeploy::models::deployment::MONITOR;
use modeldeploy::models::monitor::MonitorRecord;
use modeldeploy::services::Monitor;
use modeldeploy::store::{to_document, DocumentStore, MemoryStore};
use modeldeploy::workers::monitor::{run, Options};

use crate::support::FakeProbe;

const URL: &str = "http://localhost:8000/api/v1/deployments/dep-1/status";

async fn polled_deployment() -> (Arc<MemoryStore>, Arc<FakeProbe>) {
    let store = Arc::new(MemoryStore::new());
    let record = MonitorRecord::new("dep-1", "org/tiny-model", "user-1", URL.to_string());
    store
        .set(MONITOR, "dep-1", to_document(&record).unwrap())
        .await
        .unwrap();

    let view = serde_json::from_value(json!({
        "deployment_id": "dep-1",
        "status": "starting",
        "progress": 50
    }))
    .unwrap();
    let probe = Arc::new(FakeProbe::new().reply(URL, ProbeOutcome::Report(view)));
    (store, probe)
}

async fn run_for(store: Arc<MemoryStore>, probe: Arc<FakeProbe>, uptime: Duration) {
    let monitor = Monitor::new(store, probe);
    let options = Options {
        interval: Duration::from_secs(5),
    };
    run(
        &options,
        &monitor,
        tokio::time::sleep,
        Box::pin(tokio::time::sleep(uptime)),
    )
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_worker_ticks_before_first_sleep() {
    let (store, probe) = polled_deployment().await;

    run_for(store, probe.clone(), Duration::from_secs(1)).await;

    assert_eq!(probe.requests(), vec![URL.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_worker_ticks_until_shutdown() {
    let (store, probe) = polled_deployment().await;

    run_for(store.clone(), probe.clone(), Duration::from_secs(12)).await;

    // t=0s, t=5s and t=10s
    assert_eq!(probe.requests().len(), 3);
    let record = store.get(MONITOR, "dep-1").await.unwrap().unwrap();
    assert_eq!(record["status"], "starting");
    assert_eq!(record["isPolling"], true);
}
