//! Startup detection for a freshly launched serving container.
//!
//! The engine announces where it listens on its log output. Those lines are
//! matched against a fixed table of patterns, one per endpoint slot, in
//! three tiers:
//!
//! 1. follow the live log until the startup marker shows up, every slot is
//!    filled or the timeout elapses
//! 2. rescan the full log once for slots still missing
//! 3. if there is still no base URL but the container is running, build the
//!    canonical set from the port the runtime actually published
//!
//! Detection never fails. Whatever was gathered is returned.

use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::deploy::docker;
use crate::errors::DeployError;
use crate::models::endpoints::{EndpointKey, EndpointSet};
use crate::remote::RemoteSession;

/// Line printed once the engine accepts requests
pub const STARTUP_MARKER: &str = "Application startup complete";

/// Startup detector options
#[derive(Debug, Clone)]
pub struct Options {
    /// Upper bound on following the live log
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
        }
    }
}

/// Which tier produced the final endpoint set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    LiveTail,
    FullLog,
    Synthetic,
}

/// Outcome of startup detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub endpoints: EndpointSet,
    /// Whether readiness was confirmed rather than assumed
    pub startup_complete: bool,
    pub tier: Tier,
}

static BASE_URL: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"http://(?:0\.0\.0\.0|localhost|127\.0\.0\.1|\[::\]):(\d+)/").expect("valid regex")
});

/// Announcement line patterns. The first capture group is the URL.
static ANNOUNCEMENTS: LazyLock<Vec<(EndpointKey, Regex)>> = LazyLock::new(|| {
    const HOST: &str = r"http://(?:\[[^\]\s]*\]|[^\s:/\[]+):\d+";
    [
        (EndpointKey::Ui, "Kobold Lite UI", "/?"),
        (EndpointKey::Docs, "Documentation", "/redoc"),
        (EndpointKey::Completions, "Completions API", "/v1/completions"),
        (EndpointKey::Chat, "Chat API", "/v1/chat/completions"),
        (EndpointKey::Embeddings, "Embeddings API", "/v1/embeddings"),
        (EndpointKey::Tokenization, "Tokenization API", "/v1/tokenize"),
    ]
    .into_iter()
    .map(|(key, label, path)| {
        #[allow(clippy::expect_used)]
        let regex = Regex::new(&format!(r"{}:\s+({}{})", label, HOST, path)).expect("valid regex");
        (key, regex)
    })
    .collect()
});

/// Rewrite wildcard and loopback hosts to `localhost`
fn normalize_host(url: &str) -> String {
    for host in ["0.0.0.0", "127.0.0.1", "[::]"] {
        if let Some(rest) = url.strip_prefix(&format!("http://{}:", host)) {
            return format!("http://localhost:{}", rest);
        }
    }
    url.to_string()
}

/// Match one log line against the table, filling only empty slots
pub fn scan_line(line: &str, endpoints: &mut EndpointSet) {
    if !endpoints.contains(EndpointKey::BaseUrl) {
        if let Some(caps) = BASE_URL.captures(line) {
            endpoints.insert(EndpointKey::BaseUrl, format!("http://localhost:{}/", &caps[1]));
        }
    }

    for (key, regex) in ANNOUNCEMENTS.iter() {
        if let Some(caps) = regex.captures(line) {
            endpoints.fill(*key, normalize_host(&caps[1]));
        }
    }
}

/// Scan a block of log text. Returns whether the startup marker is present.
pub fn scan_text(text: &str, endpoints: &mut EndpointSet) -> bool {
    let mut startup_complete = false;
    for line in text.lines() {
        scan_line(line, endpoints);
        startup_complete |= line.contains(STARTUP_MARKER);
    }
    startup_complete
}

/// Detect readiness and endpoints of `container_id`.
///
/// `host_port` is the port that was requested and is only used when the
/// runtime cannot report the published port.
pub async fn detect(
    session: &dyn RemoteSession,
    container_id: &str,
    host_port: u16,
    options: &Options,
) -> Detection {
    info!("Monitoring container {} startup on port {}...", container_id, host_port);

    let mut endpoints = EndpointSet::new();
    let mut startup_complete = false;
    let mut tier = Tier::LiveTail;

    // Tier 1
    match tokio::time::timeout(options.timeout, live_tail(session, container_id, &mut endpoints)).await {
        Ok(Ok(confirmed)) => startup_complete = confirmed,
        Ok(Err(e)) => warn!("Following container logs failed: {}", e),
        Err(_) => warn!("Stopped following container logs after {:?}", options.timeout),
    }

    // Tier 2
    if !endpoints.is_complete() {
        tier = Tier::FullLog;
        info!("Extracting endpoints from complete logs...");
        match docker::logs(session, container_id).await {
            Ok(text) => startup_complete |= scan_text(&text, &mut endpoints),
            Err(e) => warn!("Fetching container logs failed: {}", e),
        }
    }

    // Tier 3
    if !endpoints.contains(EndpointKey::BaseUrl) {
        match docker::is_running(session, container_id).await {
            Ok(true) => {
                let port = match docker::published_port(session, container_id).await {
                    Ok(Some(port)) => port,
                    Ok(None) => host_port,
                    Err(e) => {
                        warn!("Reading port mappings failed: {}", e);
                        host_port
                    }
                };
                warn!("Using default endpoint configuration with port {}", port);
                endpoints = EndpointSet::synthesize(port);
                startup_complete = true;
                tier = Tier::Synthetic;
            }
            Ok(false) => info!("Container {} is not running", container_id),
            Err(e) => warn!("Inspecting container failed: {}", e),
        }
    }

    if !startup_complete {
        let missing = endpoints
            .missing()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            "{}",
            DeployError::DetectionTimeout(format!(
                "container {} did not confirm startup, continuing with {} endpoint(s) (missing: {})",
                container_id,
                endpoints.len(),
                missing
            ))
        );
    }

    Detection {
        endpoints,
        startup_complete,
        tier,
    }
}

/// Follow the live log. Returns true once readiness is confirmed.
async fn live_tail(
    session: &dyn RemoteSession,
    container_id: &str,
    endpoints: &mut EndpointSet,
) -> Result<bool, DeployError> {
    let mut lines = docker::logs_follow(session, container_id).await?;
    while let Some(line) = lines.next().await {
        scan_line(&line, endpoints);
        if line.contains(STARTUP_MARKER) {
            debug!("Startup marker seen");
            return Ok(true);
        }
        if endpoints.is_complete() {
            debug!("Every endpoint announced");
            return Ok(true);
        }
    }
    Ok(false)
}
