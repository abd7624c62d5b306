//! Deployment provisioning

pub mod compose;
pub mod deps;
pub mod detector;
pub mod docker;
pub mod endpoints;
pub mod fsm;
pub mod pipeline;
pub mod ports;
pub mod registry;
pub mod tunnel;
