//! Remote prerequisite installation

use std::time::Duration;

use tracing::{info, warn};

use crate::errors::DeployError;
use crate::remote::{sudo_prefix, RemoteSession};

/// Dependency ensurer options
#[derive(Debug, Clone)]
pub struct Options {
    /// Pause after each successful install so package state settles
    pub settle_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// A tool that must be present on the remote host
struct Prerequisite {
    binary: &'static str,
    label: &'static str,
    /// Whether an install failure aborts the deployment
    required: bool,
    /// Install command, given the sudo prefix
    install: fn(&str) -> String,
}

const NODE: Prerequisite = Prerequisite {
    binary: "node",
    label: "Node.js",
    required: true,
    install: |sudo| format!("{sudo}apt-get update && {sudo}apt-get install -y nodejs npm"),
};

const LOCALTUNNEL: Prerequisite = Prerequisite {
    binary: "lt",
    label: "localtunnel",
    required: false,
    install: |sudo| format!("{sudo}npm install -g localtunnel"),
};

/// Whether `binary` is on the remote PATH
pub async fn is_installed(session: &dyn RemoteSession, binary: &str) -> Result<bool, DeployError> {
    let output = session.exec(&format!("which {}", binary)).await?;
    Ok(output.success())
}

/// Install Node.js/npm if missing
pub async fn install_node(
    session: &dyn RemoteSession,
    password: Option<&str>,
    options: &Options,
) -> Result<(), DeployError> {
    install(session, &NODE, &sudo_prefix(password), options).await
}

/// Install the localtunnel client via npm
pub async fn install_localtunnel(
    session: &dyn RemoteSession,
    password: Option<&str>,
    options: &Options,
) -> Result<(), DeployError> {
    install(session, &LOCALTUNNEL, &sudo_prefix(password), options).await
}

async fn install(
    session: &dyn RemoteSession,
    prerequisite: &Prerequisite,
    sudo: &str,
    options: &Options,
) -> Result<(), DeployError> {
    info!("Installing {}...", prerequisite.label);
    let output = session.exec(&(prerequisite.install)(sudo)).await?;
    if !output.success() {
        return Err(DeployError::DependencyInstall(format!(
            "Failed to install {}: {}",
            prerequisite.label,
            output.stderr.trim()
        )));
    }
    tokio::time::sleep(options.settle_delay).await;
    Ok(())
}

/// Make sure the node runtime and the tunnel client are present.
///
/// A failed runtime install aborts the deployment. A failed tunnel client
/// install only degrades exposure, so it is logged and the tunnel
/// provisioner gets another chance to install it.
pub async fn ensure_dependencies(
    session: &dyn RemoteSession,
    password: Option<&str>,
    options: &Options,
) -> Result<(), DeployError> {
    let sudo = sudo_prefix(password);

    for prerequisite in [&NODE, &LOCALTUNNEL] {
        if is_installed(session, prerequisite.binary).await? {
            continue;
        }
        match install(session, prerequisite, &sudo, options).await {
            Ok(()) => {}
            Err(e) if !prerequisite.required => {
                warn!("{}", DeployError::Tunnel(e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    info!("Dependencies check completed");
    Ok(())
}
