//! Rewriting local endpoint URLs to their public counterparts

use url::{Host, Position, Url};

use crate::models::endpoints::EndpointSet;

/// Whether a URL points at the remote host itself
fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Some(Host::Ipv6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        None => false,
    }
}

/// Map local endpoints through the tunnel.
///
/// Loopback URLs get the tunnel's scheme and authority with their own path
/// and query preserved. Everything else, and everything when there is no
/// tunnel, passes through unchanged.
pub fn map_endpoints(local: &EndpointSet, tunnel_url: Option<&str>) -> EndpointSet {
    let Some(tunnel_url) = tunnel_url else {
        return local.clone();
    };
    let base = tunnel_url.trim_end_matches('/');

    local
        .iter()
        .map(|(key, url)| {
            let mapped = match Url::parse(url) {
                Ok(parsed) if is_loopback(&parsed) => {
                    format!("{}{}", base, &parsed[Position::BeforePath..])
                }
                _ => url.to_string(),
            };
            (key, mapped)
        })
        .collect()
}
