//! Container provisioning and runtime queries on the remote host

use tracing::{debug, info, warn};

use crate::deploy::compose::{definition_files, ContainerNames};
use crate::errors::DeployError;
use crate::remote::{shell_quote, LineStream, RemoteSession};

/// Heredoc terminator for definition files
const EOF_MARKER: &str = "MODELDEPLOY_EOF";

/// What to launch
#[derive(Debug, Clone)]
pub struct ContainerPlan<'a> {
    pub deployment_id: &'a str,
    pub model_id: &'a str,
    pub user_id: &'a str,
    pub host_port: u16,
    pub auto_restart: bool,
    pub huggingface_token: Option<&'a str>,
}

/// A container that has been built and started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedContainer {
    pub container_id: String,
    pub names: ContainerNames,
}

/// Write the definition files, build and start the container and resolve its id
pub async fn provision_container(
    session: &dyn RemoteSession,
    plan: &ContainerPlan<'_>,
) -> Result<LaunchedContainer, DeployError> {
    let names = ContainerNames::new(plan.deployment_id, plan.model_id);

    write_definition_files(session, &names, plan).await?;

    info!(
        "Launching container for model {} on port {}...",
        plan.model_id, plan.host_port
    );
    launch(session, &names, plan).await?;

    let container_id = resolve_container_id(session, &names.container_name).await?;
    info!(
        "Container {} (ID: {}) launched on port {}",
        names.container_name, container_id, plan.host_port
    );

    Ok(LaunchedContainer {
        container_id,
        names,
    })
}

async fn write_definition_files(
    session: &dyn RemoteSession,
    names: &ContainerNames,
    plan: &ContainerPlan<'_>,
) -> Result<(), DeployError> {
    run_checked(
        session,
        &format!("mkdir -p {}", names.deployment_dir),
        "create deployment directory",
    )
    .await?;

    for file in definition_files(names, plan.host_port, plan.auto_restart) {
        let path = format!("{}/{}", names.deployment_dir, file.name);
        debug!("Writing {}", path);
        let command = format!(
            "cat > {path} << '{marker}'\n{contents}\n{marker}",
            path = path,
            marker = EOF_MARKER,
            contents = file.contents
        );
        run_checked(session, &command, &format!("write {}", file.name)).await?;

        if file.executable {
            run_checked(session, &format!("chmod +x {}", path), &format!("chmod {}", file.name)).await?;
        }
    }
    Ok(())
}

fn environment(plan: &ContainerPlan<'_>) -> String {
    [
        ("MODEL_ID", plan.model_id.to_string()),
        ("HOST_PORT", plan.host_port.to_string()),
        ("USER_ID", plan.user_id.to_string()),
        ("DEPLOYMENT_ID", plan.deployment_id.to_string()),
        ("HUGGINGFACE_TOKEN", plan.huggingface_token.unwrap_or_default().to_string()),
    ]
    .iter()
    .map(|(key, value)| format!("{}={}", key, shell_quote(value)))
    .collect::<Vec<_>>()
    .join(" ")
}

async fn launch(
    session: &dyn RemoteSession,
    names: &ContainerNames,
    plan: &ContainerPlan<'_>,
) -> Result<(), DeployError> {
    let env = environment(plan);

    let legacy = format!(
        "cd {} && {} docker-compose up -d --build",
        names.deployment_dir, env
    );
    let output = session.exec(&legacy).await?;
    if output.success() {
        return Ok(());
    }
    warn!(
        "docker-compose exited with status {}, retrying with the compose plugin",
        output.exit_status
    );

    let plugin = format!(
        "cd {} && {} docker compose up -d --build",
        names.deployment_dir, env
    );
    let output = session.exec(&plugin).await?;
    if !output.success() {
        return Err(DeployError::Launch(format!(
            "Error launching container: {}",
            output.stderr.trim()
        )));
    }
    Ok(())
}

async fn resolve_container_id(
    session: &dyn RemoteSession,
    container_name: &str,
) -> Result<String, DeployError> {
    let output = session
        .exec(&format!(
            "docker ps --filter {} --format '{{{{.ID}}}}'",
            shell_quote(&format!("name={}", container_name))
        ))
        .await?;

    // The filter matches substrings, the first line is the newest container
    let container_id = output.stdout_trimmed().lines().next().unwrap_or_default().trim();
    if container_id.is_empty() {
        return Err(DeployError::Launch(format!(
            "Failed to get container ID for {}",
            container_name
        )));
    }
    Ok(container_id.to_string())
}

async fn run_checked(
    session: &dyn RemoteSession,
    command: &str,
    action: &str,
) -> Result<(), DeployError> {
    let output = session.exec(command).await?;
    if !output.success() {
        return Err(DeployError::Launch(format!(
            "Failed to {}: {}",
            action,
            output.stderr.trim()
        )));
    }
    Ok(())
}

/// Follow the container's combined output
pub async fn logs_follow(
    session: &dyn RemoteSession,
    container_id: &str,
) -> Result<LineStream, DeployError> {
    session
        .stream(&format!("docker logs -f {} 2>&1", container_id))
        .await
}

/// The container's entire accumulated output
pub async fn logs(session: &dyn RemoteSession, container_id: &str) -> Result<String, DeployError> {
    let output = session
        .exec(&format!("docker logs {} 2>&1", container_id))
        .await?;
    Ok(output.stdout)
}

/// Whether the runtime reports the container as running
pub async fn is_running(session: &dyn RemoteSession, container_id: &str) -> Result<bool, DeployError> {
    let output = session
        .exec(&format!(
            "docker inspect -f '{{{{.State.Running}}}}' {}",
            container_id
        ))
        .await?;
    Ok(output.success() && output.stdout_trimmed() == "true")
}

/// Host port the container is published on, from the runtime's mapping table
pub async fn published_port(
    session: &dyn RemoteSession,
    container_id: &str,
) -> Result<Option<u16>, DeployError> {
    let output = session
        .exec(&format!("docker port {}", container_id))
        .await?;
    if !output.success() {
        return Ok(None);
    }
    Ok(parse_published_port(&output.stdout))
}

/// First `0.0.0.0:<port>` binding in `docker port` output
fn parse_published_port(output: &str) -> Option<u16> {
    output.lines().find_map(|line| {
        let (_, binding) = line.split_once("->")?;
        let port = binding.trim().strip_prefix("0.0.0.0:")?;
        port.trim().parse().ok()
    })
}
