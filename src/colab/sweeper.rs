use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::registry::SessionRegistry;

/// Periodically close sessions nobody is connected to anymore
pub fn spawn_idle_sweeper(registry: SessionRegistry, interval: Duration, idle_timeout: Duration) -> JoinHandle<()> {
    info!(
        "Idle session sweep every {:?}, timeout {:?}",
        interval, idle_timeout
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let closed = registry.sweep_idle(idle_timeout).await;
            if closed > 0 {
                info!("Idle sweep closed {} sessions", closed);
            } else {
                debug!("Idle sweep found nothing to close");
            }
        }
    })
}
