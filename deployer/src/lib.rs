//! Model deployment service library
//!
//! Provisions model-serving containers on remote hosts and tracks their
//! readiness through a persistent record store.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod remote;
pub mod server;
pub mod services;
pub mod store;
pub mod storage;
pub mod utils;
pub mod workers;
