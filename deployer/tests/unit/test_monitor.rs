//! Monitor scheduler tests

use std::sync::Arc;

use serde_json::json;

use modeldeploy::http::ProbeOutcome;
use modeldeploy::models::deployment::{StatusView, MONITOR};
use modeldeploy::models::monitor::MonitorRecord;
use modeldeploy::services::Monitor;
use modeldeploy::store::{to_document, DocumentStore, MemoryStore};

use crate::support::FakeProbe;

fn url(id: &str) -> String {
    format!("http://localhost:8000/api/v1/deployments/{}/status", id)
}

fn report(value: serde_json::Value) -> ProbeOutcome {
    ProbeOutcome::Report(serde_json::from_value::<StatusView>(value).unwrap())
}

async fn track(store: &MemoryStore, id: &str, monitor_url: String) {
    let record = MonitorRecord::new(id, "org/tiny-model", "user-1", monitor_url);
    store
        .set(MONITOR, id, to_document(&record).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_tick_stops_polling_terminal_deployments() {
    let store = Arc::new(MemoryStore::new());
    for id in ["done", "broken", "busy"] {
        track(&store, id, url(id)).await;
    }
    let probe = FakeProbe::new()
        .reply(
            &url("done"),
            report(json!({
                "deployment_id": "done",
                "status": "active",
                "progress": 100,
                "tunnel_url": "https://done.loca.lt",
                "deployment_duration": 42.5
            })),
        )
        .reply(
            &url("broken"),
            report(json!({
                "deployment_id": "broken",
                "status": "failed",
                "progress": -1,
                "error": "Deployment failed: Container launch failed: no space left"
            })),
        )
        .reply(
            &url("busy"),
            report(json!({"deployment_id": "busy", "status": "deploying", "progress": 15})),
        );
    let monitor = Monitor::new(store.clone(), Arc::new(probe));

    assert_eq!(monitor.tick().await.unwrap(), 3);

    let done = store.get(MONITOR, "done").await.unwrap().unwrap();
    assert_eq!(done["isPolling"], false);
    assert_eq!(done["status"], "active");
    assert_eq!(done["tunnelUrl"], "https://done.loca.lt");
    assert_eq!(done["deploymentDuration"], 42.5);

    let broken = store.get(MONITOR, "broken").await.unwrap().unwrap();
    assert_eq!(broken["isPolling"], false);
    assert_eq!(
        broken["errorMessage"],
        "Deployment failed: Container launch failed: no space left"
    );

    let busy = store.get(MONITOR, "busy").await.unwrap().unwrap();
    assert_eq!(busy["isPolling"], true);
    assert_eq!(busy["status"], "deploying");
    assert_eq!(busy["progress"], 15);

    // Only the deployment still in flight is checked again
    assert_eq!(monitor.tick().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bad_monitor_urls_stop_polling() {
    let store = Arc::new(MemoryStore::new());
    track(&store, "blank", String::new()).await;
    track(&store, "odd", "http://localhost:8000/api/v1/elsewhere".to_string()).await;
    let probe = Arc::new(FakeProbe::new());
    let monitor = Monitor::new(store.clone(), probe.clone());

    assert_eq!(monitor.tick().await.unwrap(), 2);

    let blank = store.get(MONITOR, "blank").await.unwrap().unwrap();
    assert_eq!(blank["isPolling"], false);
    assert_eq!(blank["errorMessage"], "Missing monitor URL");

    let odd = store.get(MONITOR, "odd").await.unwrap().unwrap();
    assert_eq!(odd["isPolling"], false);
    assert_eq!(odd["errorMessage"], "Invalid monitor URL format");
    assert!(probe.requests().is_empty());
}

#[tokio::test]
async fn test_request_errors_keep_polling() {
    let store = Arc::new(MemoryStore::new());
    track(&store, "flaky", url("flaky")).await;
    track(&store, "down", url("down")).await;
    let probe = FakeProbe::new().reply(&url("flaky"), ProbeOutcome::HttpStatus(502));
    let monitor = Monitor::new(store.clone(), Arc::new(probe));

    monitor.tick().await.unwrap();

    let flaky = store.get(MONITOR, "flaky").await.unwrap().unwrap();
    assert_eq!(flaky["isPolling"], true);
    assert_eq!(flaky["lastErrorMessage"], "HTTP Error: 502");

    let down = store.get(MONITOR, "down").await.unwrap().unwrap();
    assert_eq!(down["isPolling"], true);
    assert!(down["lastErrorMessage"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn test_tick_without_records() {
    let monitor = Monitor::new(Arc::new(MemoryStore::new()), Arc::new(FakeProbe::new()));
    assert_eq!(monitor.tick().await.unwrap(), 0);
}
