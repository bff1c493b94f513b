use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::hub::Hub;

/// Periodically unsubscribe queues nobody drains.
///
/// Catches handles that leak without being dropped. Stops when `shutdown`
/// flips to `true`, its sender goes away, or the hub itself is dropped.
pub fn spawn_reaper(
    hub: &Hub,
    interval: Duration,
    max_idle: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let hub = Arc::downgrade(&hub.inner);

    tokio::spawn(async move {
        info!(?interval, ?max_idle, "subscriber reaper started");
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let Some(inner) = hub.upgrade() else {
                        break;
                    };
                    let reaped = Hub::from_inner(inner).reap_idle(max_idle);
                    if reaped > 0 {
                        warn!(reaped, "idle subscribers removed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("subscriber reaper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatcast_core::HubConfig;

    use crate::queue::QueueState;

    #[tokio::test(start_paused = true)]
    async fn reaper_detaches_leaked_handles() {
        let hub = Hub::new(HubConfig::unbounded());
        let leaked = hub.subscribe().unwrap();
        let (_tx, rx) = watch::channel(false);

        let task = spawn_reaper(&hub, Duration::from_secs(1), Duration::from_secs(5), rx);
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert_eq!(leaked.state(), QueueState::Detached);
        assert_eq!(hub.subscriber_count(), 0);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_stops_on_shutdown() {
        let hub = Hub::new(HubConfig::unbounded());
        let (tx, rx) = watch::channel(false);
        let task = spawn_reaper(&hub, Duration::from_secs(1), Duration::from_secs(5), rx);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_stops_when_hub_is_dropped() {
        let hub = Hub::new(HubConfig::unbounded());
        let (_tx, rx) = watch::channel(false);
        let task = spawn_reaper(&hub, Duration::from_secs(1), Duration::from_secs(5), rx);

        drop(hub);
        task.await.unwrap();
    }
}
