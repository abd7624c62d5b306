//! Request-level operations over the store and the pipeline

pub mod deployments;
pub mod monitor;

pub use deployments::DeploymentService;
pub use monitor::Monitor;
