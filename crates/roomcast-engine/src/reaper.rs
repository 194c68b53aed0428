//! Background liveness sweep.
//!
//! Ticks on a fixed interval and evicts connections that have been silent
//! past the idle threshold. Eviction goes through [`Hub::evict`], so a
//! reaped connection is torn down exactly like any other disconnect.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hub::Hub;

/// Run the sweep loop until `cancel` fires.
pub async fn run_reaper(
    hub: Arc<Hub>,
    sweep_interval: Duration,
    idle_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        interval_secs = sweep_interval.as_secs(),
        idle_timeout_secs = idle_timeout.as_secs(),
        "reaper started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reaped = hub.evict_idle(idle_timeout);
                if reaped > 0 {
                    info!(reaped, "reaper swept idle connections");
                } else {
                    debug!("reaper sweep found nothing idle");
                }
            }
            () = cancel.cancelled() => {
                info!("reaper stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use crate::testing::ChannelSink;

    fn hub_with_connection() -> (Arc<Hub>, roomcast_core::ConnectionId) {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let (sink, rx) = ChannelSink::new(4);
        std::mem::forget(rx); // keep the send path open
        let conn = hub.register(Some("alice".into()), sink);
        (hub, conn.id.clone())
    }

    #[tokio::test]
    async fn reaper_evicts_idle_connection_and_its_room() {
        let (hub, id) = hub_with_connection();
        hub.subscribe(&id, "demo", None).unwrap();
        assert_eq!(hub.stats().rooms, 1);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reaper(
            hub.clone(),
            Duration::from_millis(10),
            Duration::from_millis(20),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(hub.registry().get(&id).is_none());
        assert_eq!(hub.stats().rooms, 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn active_connection_survives_sweeps() {
        let (hub, id) = hub_with_connection();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reaper(
            hub.clone(),
            Duration::from_millis(10),
            Duration::from_millis(40),
            cancel.clone(),
        ));

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            hub.registry().get(&id).unwrap().mark_alive();
        }
        assert!(hub.registry().get(&id).is_some());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reaper(
            hub,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            cancel.clone(),
        ));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reaper must exit promptly on cancel")
            .unwrap();
    }
}
