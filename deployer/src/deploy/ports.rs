//! Host port allocation

use sha2::{Digest, Sha256};

/// Lowest derived port. Keeps clear of privileged and common service ports.
pub const PORT_FLOOR: u16 = 2242;

/// Number of distinct derived ports
pub const PORT_SPAN: u16 = 60000;

/// Port to bind the remote container to.
///
/// An explicitly requested port wins. Otherwise the port is derived from the
/// deployment id, so retries of the same deployment reuse the same port.
/// Collisions between deployments are possible and surface at launch time.
pub fn allocate_port(deployment_id: &str, requested: Option<u16>) -> u16 {
    requested.unwrap_or_else(|| derive_port(deployment_id))
}

fn derive_port(deployment_id: &str) -> u16 {
    let digest = Sha256::digest(deployment_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(prefix);
    // hash % PORT_SPAN < 60000, so the sum stays below u16::MAX
    PORT_FLOOR + (hash % u64::from(PORT_SPAN)) as u16
}
