//! Data models

pub mod deployment;
pub mod endpoints;
pub mod monitor;
