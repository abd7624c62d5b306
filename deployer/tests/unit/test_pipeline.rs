//! Provisioning pipeline tests

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use modeldeploy::deploy::fsm::DeploymentStatus;
use modeldeploy::deploy::pipeline::{Options, Pipeline};
use modeldeploy::deploy::ports::allocate_port;
use modeldeploy::errors::DeployError;
use modeldeploy::models::deployment::{Deployment, DeploymentRequest, DEPLOYMENTS};
use modeldeploy::remote::SessionConnector;
use modeldeploy::store::{to_document, Document, DocumentStore, MemoryStore, Query};

use crate::support::{fail, ok, request, ScriptedConnector, ScriptedSession};

const ID: &str = "1a2b3c4d-5e6f-7a8b-9c0d-0e1f2a3b4c5d";

const STARTUP_LOG: [&str; 3] = [
    "INFO:     Chat API: http://0.0.0.0:2242/v1/chat/completions",
    "INFO:     Documentation: http://0.0.0.0:2242/redoc",
    "INFO:     Application startup complete.",
];

const FULL_STARTUP_LOG: [&str; 7] = [
    "INFO:     Kobold Lite UI: http://0.0.0.0:2242/",
    "INFO:     Documentation: http://0.0.0.0:2242/redoc",
    "INFO:     Completions API: http://0.0.0.0:2242/v1/completions",
    "INFO:     Chat API: http://0.0.0.0:2242/v1/chat/completions",
    "INFO:     Embeddings API: http://0.0.0.0:2242/v1/embeddings",
    "INFO:     Tokenization API: http://0.0.0.0:2242/v1/tokenize",
    "INFO:     Application startup complete.",
];

const TUNNEL_URL: &str = "https://my-api-1a2b3c4d.loca.lt";

fn healthy_host() -> ScriptedSession {
    ScriptedSession::new()
        .on("/etc/machine-id", ok("3f9c2d1e\n"))
        .on("docker ps --filter", ok("c0ffee12\n"))
        .stream_lines(&STARTUP_LOG, true)
}

fn with_tunnel(session: ScriptedSession) -> ScriptedSession {
    session
        .on("ps -p", ok(""))
        .on("cat ~/tunnel-1a2b3c4d", ok("your url is: https://my-api-1a2b3c4d.loca.lt\n"))
        .on("curl -s -o /dev/null", ok("200"))
}

async fn run_on(
    store: Arc<dyn DocumentStore>,
    connector: impl SessionConnector + 'static,
    request: DeploymentRequest,
) -> DeploymentStatus {
    let queued = Deployment::queued(ID, &request);
    store
        .set(DEPLOYMENTS, ID, to_document(&queued).unwrap())
        .await
        .unwrap();

    let pipeline = Pipeline::new(store, Arc::new(connector), Options::default());
    pipeline.run(ID, request).await
}

async fn run_request(
    connector: impl SessionConnector + 'static,
    request: DeploymentRequest,
) -> (DeploymentStatus, Document) {
    let store = Arc::new(MemoryStore::new());
    let status = run_on(store.clone(), connector, request).await;
    let record = store.get(DEPLOYMENTS, ID).await.unwrap().unwrap();
    (status, record)
}

async fn run(connector: impl SessionConnector + 'static) -> (DeploymentStatus, Document) {
    run_request(connector, request("My Api")).await
}

/// Accepts the initial record, then rejects every update
struct ReadOnlyStore(MemoryStore);

#[async_trait]
impl DocumentStore for ReadOnlyStore {
    async fn set(&self, collection: &str, id: &str, fields: Document) -> Result<(), DeployError> {
        self.0.set(collection, id, fields).await
    }

    async fn update(&self, collection: &str, id: &str, _fields: Document) -> Result<(), DeployError> {
        Err(DeployError::Persistence(format!("{}/{} is read-only", collection, id)))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, DeployError> {
        self.0.get(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Document)>, DeployError> {
        self.0.query(collection, query).await
    }
}

fn assert_no_credentials(record: &Document) {
    let text = serde_json::to_string(record).unwrap();
    assert!(!text.contains("hunter2"));
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_reaches_active_through_tunnel() {
    let session = with_tunnel(healthy_host());

    let (status, record) = run(ScriptedConnector::new(session.clone())).await;

    assert_eq!(status, DeploymentStatus::Active);
    assert_eq!(record["status"], "active");
    assert_eq!(record["machineId"], "3f9c2d1e");
    assert_eq!(record["containerId"], "c0ffee12");
    assert_eq!(record["hostPort"], 4100);
    assert_eq!(record["tunnelUrl"], "https://my-api-1a2b3c4d.loca.lt");
    assert_eq!(
        record["localEndpoints"]["chat"],
        "http://localhost:2242/v1/chat/completions"
    );
    assert_eq!(
        record["endpoints"]["chat"],
        "https://my-api-1a2b3c4d.loca.lt/v1/chat/completions"
    );
    assert_eq!(record["containerDetails"]["containerPort"], 2242);
    assert_eq!(
        record["containerDetails"]["containerName"],
        format!("aphrodite-org-tiny-model-{}", ID)
    );
    assert!(record["deploymentDuration"].as_f64().unwrap() >= 0.0);
    assert!(record.get("error").is_none());
    assert_no_credentials(&record);
    assert!(session.closed());
}

#[tokio::test(start_paused = true)]
async fn test_refused_connection_fails_deployment() {
    let (status, record) = run(ScriptedConnector::refusing()).await;

    assert_eq!(status, DeploymentStatus::Failed);
    assert_eq!(record["status"], "failed");
    let error = record["error"].as_str().unwrap();
    assert!(error.starts_with("Deployment failed: "), "{}", error);
    assert!(record.get("failedAt").is_some());
    assert!(record.get("machineId").is_none());
    assert!(record["deploymentDuration"].as_f64().unwrap() >= 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_records_machine_and_closes_session() {
    let session = ScriptedSession::new()
        .on("/etc/machine-id", ok("3f9c2d1e\n"))
        .on("docker-compose up", fail("docker-compose: not found"))
        .on("docker compose up", fail("port is already allocated"));

    let (status, record) = run(ScriptedConnector::new(session.clone())).await;

    assert_eq!(status, DeploymentStatus::Failed);
    assert_eq!(record["machineId"], "3f9c2d1e");
    assert!(record["error"]
        .as_str()
        .unwrap()
        .contains("port is already allocated"));
    assert!(record.get("containerId").is_none());
    assert_eq!(session.count("docker ps --filter"), 0);
    assert_no_credentials(&record);
    assert!(session.closed());
}

#[tokio::test(start_paused = true)]
async fn test_missing_container_id_fails_deployment() {
    let session = ScriptedSession::new()
        .on("/etc/machine-id", ok("3f9c2d1e\n"))
        .on("docker ps --filter", ok("\n"));

    let (status, record) = run(ScriptedConnector::new(session.clone())).await;

    assert_eq!(status, DeploymentStatus::Failed);
    assert!(record["error"]
        .as_str()
        .unwrap()
        .contains("Failed to get container ID"));
    assert!(session.closed());
}

#[tokio::test(start_paused = true)]
async fn test_direct_ip_fallback_keeps_local_endpoints() {
    let session = healthy_host()
        .on("ps -p", fail(""))
        .on("api.ipify.org", ok("203.0.113.7\n"));

    let (status, record) = run(ScriptedConnector::new(session.clone())).await;

    assert_eq!(status, DeploymentStatus::Active);
    assert_eq!(record["tunnelUrl"], "http://203.0.113.7:4100");
    assert_eq!(record["endpoints"], record["localEndpoints"]);
    assert_ne!(record["endpoints"], Value::Null);
    assert!(session.closed());
}

#[tokio::test(start_paused = true)]
async fn test_derived_port_with_full_log_yields_complete_endpoints() {
    let session = with_tunnel(healthy_host().stream_lines(&FULL_STARTUP_LOG, true));
    let mut request = request("My Api");
    request.host_port = None;

    let (status, record) = run_request(ScriptedConnector::new(session.clone()), request).await;

    assert_eq!(status, DeploymentStatus::Active);
    assert_eq!(record["hostPort"], allocate_port(ID, None));
    assert_eq!(record["tunnelUrl"], TUNNEL_URL);

    let local = record["localEndpoints"].as_object().unwrap();
    let mapped = record["endpoints"].as_object().unwrap();
    assert_eq!(local.len(), 7);
    assert_eq!(mapped.len(), 7);
    assert_eq!(local["base_url"], "http://localhost:2242/");
    assert_eq!(local["tokenization"], "http://localhost:2242/v1/tokenize");
    assert_eq!(mapped["ui"], format!("{}/", TUNNEL_URL));
    assert_eq!(mapped["embeddings"], format!("{}/v1/embeddings", TUNNEL_URL));
    assert!(mapped
        .values()
        .all(|url| url.as_str().unwrap().starts_with(TUNNEL_URL)));
    // Ready from the live log alone
    assert_eq!(session.count("docker logs c0ffee12 2>&1"), 0);
    assert!(session.closed());
}

#[tokio::test(start_paused = true)]
async fn test_uninstallable_tunnel_client_still_reaches_active() {
    let session = healthy_host()
        .on("which lt", fail(""))
        .on("npm install -g localtunnel", fail("EACCES: permission denied"))
        .on("curl -s --max-time", fail(""));
    let mut request = request("My Api");
    request.host_port = None;

    let (status, record) = run_request(ScriptedConnector::new(session.clone()), request).await;

    assert_eq!(status, DeploymentStatus::Active);
    assert_eq!(record["status"], "active");
    assert_eq!(record["tunnelUrl"], Value::Null);
    assert_eq!(record["hostPort"], allocate_port(ID, None));
    assert_eq!(record["endpoints"], record["localEndpoints"]);
    assert_eq!(
        record["endpoints"]["chat"],
        "http://localhost:2242/v1/chat/completions"
    );
    assert!(session.count("npm install -g localtunnel") >= 1);
    assert_eq!(session.count("lt --port"), 0);
    assert!(record.get("error").is_none());
    assert!(session.closed());
}

#[tokio::test(start_paused = true)]
async fn test_store_write_failures_do_not_change_outcome() {
    let store = Arc::new(ReadOnlyStore(MemoryStore::new()));
    let session = with_tunnel(healthy_host());

    let status = run_on(
        store.clone(),
        ScriptedConnector::new(session.clone()),
        request("My Api"),
    )
    .await;

    assert_eq!(status, DeploymentStatus::Active);
    let record = store.get(DEPLOYMENTS, ID).await.unwrap().unwrap();
    assert_eq!(record["status"], "queued");
    assert!(session.closed());
}

#[tokio::test(start_paused = true)]
async fn test_model_id_cannot_inject_remote_commands() {
    let session = with_tunnel(healthy_host());
    let mut request = request("My Api");
    request.model_id = "x;touch /tmp/pwned;#".to_string();

    let (status, record) = run_request(ScriptedConnector::new(session.clone()), request).await;

    assert_eq!(status, DeploymentStatus::Active);
    let container_name = format!("aphrodite-x-touch--tmp-pwned---{}", ID);
    assert_eq!(record["containerDetails"]["containerName"], container_name);
    assert_eq!(
        record["containerDetails"]["image"],
        "aphrodite-engine-x-touch--tmp-pwned--"
    );

    let commands = session.commands();
    assert!(commands.contains(&format!(
        "docker ps --filter 'name={}' --format '{{{{.ID}}}}'",
        container_name
    )));
    // The raw id only reaches the remote shell as a quoted value
    for command in commands.iter().filter(|c| c.contains("touch /tmp/pwned")) {
        assert!(command.contains("MODEL_ID='x;touch /tmp/pwned;#'"), "{}", command);
    }
    assert!(session.closed());
}
