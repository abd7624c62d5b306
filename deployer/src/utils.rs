//! Utility functions

use serde::{Deserialize, Serialize};

/// Service name reported by the root route
pub const SERVICE_NAME: &str = "Aphrodite Engine Deployment API";

/// Version information for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
