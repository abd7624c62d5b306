//! Public exposure of a container port.
//!
//! Tries, in order: the tunnel client with the requested subdomain, the
//! tunnel client with a provider-assigned subdomain, a bare public IP URL.
//! Each step only degrades exposure, none of them fails the deployment.

use std::net::{IpAddr, SocketAddr};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::deploy::deps;
use crate::errors::DeployError;
use crate::remote::{shell_quote, RemoteSession};

static TUNNEL_URL: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"your url is: (https://\S+)").expect("valid regex")
});

/// Tunnel provisioner options
#[derive(Debug, Clone)]
pub struct Options {
    /// Launches with the requested subdomain before giving up on it
    pub attempts: u32,

    /// Wait between launching the client and reading its log
    pub settle_delay: Duration,

    /// Wait between killing a failed client and relaunching it
    pub retry_delay: Duration,

    /// Services returning the caller's public IP as plain text, tried in order
    pub ip_services: Vec<String>,

    /// Used when the tunnel client has to be installed first
    pub dependencies: deps::Options,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            attempts: 3,
            settle_delay: Duration::from_secs(5),
            retry_delay: Duration::from_secs(2),
            ip_services: vec![
                "https://api.ipify.org".to_string(),
                "https://ifconfig.me/ip".to_string(),
                "https://icanhazip.com".to_string(),
            ],
            dependencies: deps::Options::default(),
        }
    }
}

/// How the container ended up being reachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelOutcome {
    /// Public tunnel URL
    Tunnel(String),
    /// `http://<public-ip>:<port>`
    DirectIp(String),
    Unavailable,
}

impl TunnelOutcome {
    /// The reachability URL to record, if any
    pub fn url(&self) -> Option<&str> {
        match self {
            TunnelOutcome::Tunnel(url) | TunnelOutcome::DirectIp(url) => Some(url.as_str()),
            TunnelOutcome::Unavailable => None,
        }
    }

    /// The URL to map loopback endpoints through. Only a real tunnel qualifies.
    pub fn tunnel_url(&self) -> Option<&str> {
        match self {
            TunnelOutcome::Tunnel(url) => Some(url.as_str()),
            _ => None,
        }
    }
}

/// What to expose
#[derive(Debug, Clone)]
pub struct TunnelRequest<'a> {
    pub deployment_id: &'a str,
    pub port: u16,
    pub subdomain: &'a str,
    /// Elevation credential for installing the client
    pub password: Option<&'a str>,
}

/// Per-deployment files of the tunnel client on the remote host
struct Workdir {
    dir: String,
}

impl Workdir {
    fn new(deployment_id: &str) -> Self {
        let prefix = deployment_id.get(..8).unwrap_or(deployment_id);
        Self {
            dir: format!("~/tunnel-{}", prefix),
        }
    }

    fn log(&self) -> String {
        format!("{}/tunnel.log", self.dir)
    }

    fn pid(&self) -> String {
        format!("{}/tunnel.pid", self.dir)
    }
}

/// Make `request.port` publicly reachable
pub async fn provision_tunnel(
    session: &dyn RemoteSession,
    request: &TunnelRequest<'_>,
    options: &Options,
) -> TunnelOutcome {
    info!("Setting up tunnel with subdomain: {}...", request.subdomain);
    let workdir = Workdir::new(request.deployment_id);

    if ensure_client(session, request.password, options).await {
        match session.exec(&format!("mkdir -p {}", workdir.dir)).await {
            Ok(output) if output.success() => {
                if let Some(url) = launch_with_retries(session, &workdir, request, options).await {
                    return TunnelOutcome::Tunnel(url);
                }
            }
            Ok(output) => warn!(
                "{}",
                DeployError::Tunnel(format!("cannot create {}: {}", workdir.dir, output.stderr.trim()))
            ),
            Err(e) => warn!("{}", DeployError::Tunnel(e.to_string())),
        }
    } else {
        warn!("Tunnel client unavailable, skipping to direct IP exposure");
    }

    match discover_public_ip(session, options).await {
        Some(ip) => {
            let url = format!("http://{}", SocketAddr::new(ip, request.port));
            info!("Falling back to direct IP URL {}", url);
            TunnelOutcome::DirectIp(url)
        }
        None => {
            warn!(
                "{}",
                DeployError::Tunnel(format!(
                    "no public URL for deployment {}",
                    request.deployment_id
                ))
            );
            TunnelOutcome::Unavailable
        }
    }
}

/// Check for the tunnel client and install it if missing
async fn ensure_client(session: &dyn RemoteSession, password: Option<&str>, options: &Options) -> bool {
    match deps::is_installed(session, "lt").await {
        Ok(true) => return true,
        Ok(false) => warn!("Localtunnel not found, attempting to install..."),
        Err(e) => {
            warn!("{}", DeployError::Tunnel(e.to_string()));
            return false;
        }
    }

    let installed = async {
        if !deps::is_installed(session, "npm").await? {
            deps::install_node(session, password, &options.dependencies).await?;
        }
        deps::install_localtunnel(session, password, &options.dependencies).await
    }
    .await;

    match installed {
        Ok(()) => true,
        Err(e) => {
            warn!("{}", DeployError::Tunnel(format!("installing the tunnel client: {}", e)));
            false
        }
    }
}

async fn launch_with_retries(
    session: &dyn RemoteSession,
    workdir: &Workdir,
    request: &TunnelRequest<'_>,
    options: &Options,
) -> Option<String> {
    for attempt in 1..=options.attempts {
        match launch_once(session, workdir, request.port, Some(request.subdomain), options).await {
            Ok(Some(url)) => return Some(url),
            Ok(None) => warn!("Tunnel attempt {}/{} failed", attempt, options.attempts),
            Err(e) => warn!("Tunnel attempt {}/{} failed: {}", attempt, options.attempts, e),
        }
        if attempt < options.attempts {
            kill_stale(session, request.port).await;
            tokio::time::sleep(options.retry_delay).await;
        }
    }

    warn!(
        "Subdomain {} unavailable after {} attempts, trying an assigned subdomain",
        request.subdomain, options.attempts
    );
    match launch_once(session, workdir, request.port, None, options).await {
        Ok(Some(url)) => return Some(url),
        Ok(None) => warn!("Tunnel without subdomain failed"),
        Err(e) => warn!("Tunnel without subdomain failed: {}", e),
    }
    kill_stale(session, request.port).await;
    None
}

/// Launch the client once and return its URL if it came up reachable
async fn launch_once(
    session: &dyn RemoteSession,
    workdir: &Workdir,
    port: u16,
    subdomain: Option<&str>,
    options: &Options,
) -> Result<Option<String>, DeployError> {
    kill_stale(session, port).await;

    let subdomain_arg = subdomain
        .map(|s| format!(" --subdomain {}", shell_quote(s)))
        .unwrap_or_default();
    let launch = format!(
        "cd {dir} && (nohup lt --port {port}{sub} > {log} 2>&1 < /dev/null & echo $! > {pid})",
        dir = workdir.dir,
        port = port,
        sub = subdomain_arg,
        log = workdir.log(),
        pid = workdir.pid(),
    );
    let output = session.exec(&launch).await?;
    if !output.success() {
        return Err(DeployError::Tunnel(format!(
            "failed to start tunnel process: {}",
            output.stderr.trim()
        )));
    }

    tokio::time::sleep(options.settle_delay).await;

    let alive = session
        .exec(&format!("ps -p $(cat {})", workdir.pid()))
        .await?;
    if !alive.success() {
        debug!("Tunnel process is not running");
        return Ok(None);
    }

    let log = session.exec(&format!("cat {}", workdir.log())).await?;
    let Some(url) = TUNNEL_URL
        .captures(&log.stdout)
        .map(|caps| caps[1].to_string())
    else {
        debug!("Tunnel log has no URL yet");
        return Ok(None);
    };

    let check = session
        .exec(&format!(
            "curl -s -o /dev/null -w '%{{http_code}}' {}",
            shell_quote(&url)
        ))
        .await?;
    let code = check.stdout_trimmed();
    if code.starts_with('2') || code.starts_with('3') {
        info!("Tunnel URL: {}", url);
        Ok(Some(url))
    } else {
        warn!("Tunnel URL {} returned status {}", url, code);
        Ok(None)
    }
}

async fn kill_stale(session: &dyn RemoteSession, port: u16) {
    if let Err(e) = session
        .exec(&format!("pkill -f 'lt --port {}' || true", port))
        .await
    {
        debug!("Stale tunnel cleanup failed: {}", e);
    }
}

/// Public IP of the remote host, from the first service that answers with one
async fn discover_public_ip(session: &dyn RemoteSession, options: &Options) -> Option<IpAddr> {
    for service in &options.ip_services {
        match session
            .exec(&format!("curl -s --max-time 10 {}", service))
            .await
        {
            Ok(output) if output.success() => match output.stdout_trimmed().parse::<IpAddr>() {
                Ok(ip) => return Some(ip),
                Err(_) => debug!("{} returned no IP address", service),
            },
            Ok(output) => debug!("{} exited with status {}", service, output.exit_status),
            Err(e) => debug!("{} failed: {}", service, e),
        }
    }
    None
}
