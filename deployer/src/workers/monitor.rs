//! Periodic deployment monitoring worker

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::services::monitor::Monitor;

/// Monitor worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Pause between the end of one tick and the start of the next
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Run the monitor worker until `shutdown_signal` resolves.
///
/// The first tick runs immediately. The signal is only observed between ticks, so a tick that has started
/// runs to completion.
pub async fn run<S, F>(
    options: &Options,
    monitor: &Monitor,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(
        "Monitor worker starting (interval: {:?})...",
        options.interval
    );

    loop {
        match monitor.tick().await {
            Ok(checked) => debug!("Monitor tick checked {} deployment(s)", checked),
            Err(e) => error!("Error in monitoring run: {}", e),
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Monitor worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
