//! Provisioning pipeline: one run per deployment, from queued to a terminal
//! status.

use std::sync::Arc;

use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::json;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::deploy::deps;
use crate::deploy::detector::{self, Detection};
use crate::deploy::docker::{self, ContainerPlan, LaunchedContainer};
use crate::deploy::endpoints::map_endpoints;
use crate::deploy::fsm::{DeploymentFsm, DeploymentStatus};
use crate::deploy::ports::allocate_port;
use crate::deploy::tunnel::{self, TunnelRequest};
use crate::errors::DeployError;
use crate::models::deployment::{ContainerDetails, DeploymentRequest, CONTAINER_PORT, DEPLOYMENTS};
use crate::models::endpoints::EndpointSet;
use crate::remote::{RemoteSession, SessionConnector};
use crate::store::{fields, to_document, Document, DocumentStore};

/// Pipeline options
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub dependencies: deps::Options,
    pub detector: detector::Options,
    pub tunnel: tunnel::Options,
}

/// Identifying fields discovered so far, kept for the failure record
#[derive(Debug, Default)]
struct Discovered {
    machine_id: Option<String>,
    container_id: Option<String>,
}

/// Everything the final active write needs
struct Provisioned {
    container: LaunchedContainer,
    detection: Detection,
    tunnel_url: Option<String>,
    endpoints: EndpointSet,
}

/// Runs the provisioning steps for deployments
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    connector: Arc<dyn SessionConnector>,
    options: Options,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        connector: Arc<dyn SessionConnector>,
        options: Options,
    ) -> Self {
        Self {
            store,
            connector,
            options,
        }
    }

    /// Provision `deployment_id` and return the terminal status it reached.
    ///
    /// The deployment record must already exist. Every step's outcome is
    /// written to it; write failures are logged and never change the outcome.
    pub async fn run(&self, deployment_id: &str, request: DeploymentRequest) -> DeploymentStatus {
        let started = Instant::now();
        let mut fsm = DeploymentFsm::new();
        let host_port = allocate_port(deployment_id, request.host_port);

        info!(
            "Starting deployment {} of model {} on port {}",
            deployment_id, request.model_id, host_port
        );

        if let Err(e) = fsm.transition(DeploymentStatus::Deploying) {
            error!("Deployment {}: {}", deployment_id, e);
            return fsm.status();
        }
        self.persist(
            deployment_id,
            fields(json!({
                "status": DeploymentStatus::Deploying,
                "hostPort": host_port,
                "updatedAt": Utc::now(),
            })),
        )
        .await;

        let mut discovered = Discovered::default();
        let result = self
            .provision(deployment_id, &request, host_port, &mut fsm, &mut discovered)
            .await;
        let duration = started.elapsed().as_secs_f64();

        match result {
            Ok(provisioned) => {
                self.complete(deployment_id, &request, host_port, provisioned, duration)
                    .await
            }
            Err(e) => {
                error!("Deployment {} failed: {}", deployment_id, e);
                if let Err(e) = fsm.fail(e.to_string()) {
                    warn!("Deployment {}: {}", deployment_id, e);
                }
                let message = fsm.error().map(str::to_string).unwrap_or_else(|| e.to_string());
                self.record_failure(deployment_id, &message, discovered, duration)
                    .await
            }
        }

        fsm.status()
    }

    /// Steps that need a remote session. The session is closed on every path.
    async fn provision(
        &self,
        deployment_id: &str,
        request: &DeploymentRequest,
        host_port: u16,
        fsm: &mut DeploymentFsm,
        discovered: &mut Discovered,
    ) -> Result<Provisioned, DeployError> {
        let session = self.connector.connect(&request.ssh_config).await?;

        let result = self
            .provision_on(session.as_ref(), deployment_id, request, host_port, fsm, discovered)
            .await;

        if let Err(e) = session.close().await {
            warn!("Closing session for deployment {} failed: {}", deployment_id, e);
        }
        result
    }

    async fn provision_on(
        &self,
        session: &dyn RemoteSession,
        deployment_id: &str,
        request: &DeploymentRequest,
        host_port: u16,
        fsm: &mut DeploymentFsm,
        discovered: &mut Discovered,
    ) -> Result<Provisioned, DeployError> {
        let password = request.ssh_config.password();

        let machine_id = machine_identity(session).await?;
        info!("Deployment {} runs on machine {}", deployment_id, machine_id);
        discovered.machine_id = Some(machine_id.clone());
        self.persist(
            deployment_id,
            fields(json!({"machineId": machine_id, "updatedAt": Utc::now()})),
        )
        .await;

        deps::ensure_dependencies(session, password, &self.options.dependencies).await?;

        let plan = ContainerPlan {
            deployment_id,
            model_id: &request.model_id,
            user_id: &request.user_id,
            host_port,
            auto_restart: request.auto_restart,
            huggingface_token: request
                .huggingface_token
                .as_ref()
                .map(|token| token.expose_secret()),
        };
        let container = docker::provision_container(session, &plan).await?;
        discovered.container_id = Some(container.container_id.clone());

        fsm.transition(DeploymentStatus::Starting)?;
        self.persist(
            deployment_id,
            fields(json!({
                "status": DeploymentStatus::Starting,
                "containerId": container.container_id,
                "updatedAt": Utc::now(),
            })),
        )
        .await;

        let detection = detector::detect(
            session,
            &container.container_id,
            host_port,
            &self.options.detector,
        )
        .await;

        let subdomain = subdomain(&request.api_name, deployment_id);
        let outcome = tunnel::provision_tunnel(
            session,
            &TunnelRequest {
                deployment_id,
                port: host_port,
                subdomain: &subdomain,
                password,
            },
            &self.options.tunnel,
        )
        .await;

        let endpoints = map_endpoints(&detection.endpoints, outcome.tunnel_url());

        fsm.transition(DeploymentStatus::Active)?;
        Ok(Provisioned {
            container,
            detection,
            tunnel_url: outcome.url().map(str::to_string),
            endpoints,
        })
    }

    async fn complete(
        &self,
        deployment_id: &str,
        request: &DeploymentRequest,
        host_port: u16,
        provisioned: Provisioned,
        duration: f64,
    ) {
        let details = ContainerDetails {
            id: provisioned.container.container_id.clone(),
            model: request.model_id.clone(),
            host_port,
            container_port: CONTAINER_PORT,
            image: provisioned.container.names.image_name.clone(),
            container_name: provisioned.container.names.container_name.clone(),
            deployment_id: deployment_id.to_string(),
        };

        let mut doc = fields(json!({
            "status": DeploymentStatus::Active,
            "tunnelUrl": provisioned.tunnel_url,
            "deploymentCompleted": Utc::now(),
            "deploymentDuration": duration,
            "updatedAt": Utc::now(),
        }));
        match (
            to_document(&details),
            serde_json::to_value(&provisioned.detection.endpoints),
            serde_json::to_value(&provisioned.endpoints),
        ) {
            (Ok(details), Ok(local), Ok(mapped)) => {
                doc.insert("containerDetails".to_string(), details.into());
                doc.insert("localEndpoints".to_string(), local);
                doc.insert("endpoints".to_string(), mapped);
            }
            _ => error!(
                "{}",
                DeployError::Persistence(format!(
                    "cannot encode endpoints of deployment {}",
                    deployment_id
                ))
            ),
        }

        self.persist(deployment_id, doc).await;
        info!(
            "Deployment {} active after {:.1}s with {} endpoint(s)",
            deployment_id,
            duration,
            provisioned.endpoints.len()
        );
    }

    async fn record_failure(
        &self,
        deployment_id: &str,
        cause: &str,
        discovered: Discovered,
        duration: f64,
    ) {
        let now = Utc::now();
        let mut doc = fields(json!({
            "status": DeploymentStatus::Failed,
            "error": format!("Deployment failed: {}", cause),
            "failedAt": now,
            "updatedAt": now,
            "deploymentDuration": duration,
        }));
        if let Some(container_id) = discovered.container_id {
            doc.insert("containerId".to_string(), container_id.into());
            doc.insert("containerStatus".to_string(), "error".into());
        }
        if let Some(machine_id) = discovered.machine_id {
            doc.insert("machineId".to_string(), machine_id.into());
        }
        self.persist(deployment_id, doc).await;
    }

    async fn persist(&self, deployment_id: &str, doc: Document) {
        if let Err(e) = self.store.update(DEPLOYMENTS, deployment_id, doc).await {
            error!(
                "{}",
                DeployError::Persistence(format!("deployment {}: {}", deployment_id, e))
            );
        }
    }
}

/// Machine-scoped identifier of the remote host, falling back to its host name
async fn machine_identity(session: &dyn RemoteSession) -> Result<String, DeployError> {
    let output = session
        .exec("cat /etc/machine-id 2>/dev/null || hostname")
        .await?;
    let machine_id = output.stdout_trimmed();
    if machine_id.is_empty() {
        return Ok("unknown".to_string());
    }
    Ok(machine_id.to_string())
}

/// Public subdomain: the API name plus a prefix of the deployment id
pub fn subdomain(api_name: &str, deployment_id: &str) -> String {
    let prefix = deployment_id.get(..8).unwrap_or(deployment_id);
    format!("{}-{}", api_name.to_lowercase().replace(' ', "-"), prefix)
}
