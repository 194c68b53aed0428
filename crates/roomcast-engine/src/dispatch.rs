//! Recipient resolution and fan-out over a room snapshot.

use std::sync::Arc;

use roomcast_core::ConnectionId;
use tracing::debug;

use crate::registry::Registry;
use crate::sink::SendResult;

/// Result of fanning a frame out to a member snapshot.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Recipients the frame was handed to.
    pub delivered: usize,
    /// Member ids with no live registry entry (eviction raced the publish);
    /// the caller should repair the room membership.
    pub stale: Vec<ConnectionId>,
    /// Recipients whose send path is gone; the caller should evict them.
    pub closed: Vec<ConnectionId>,
}

/// Fan one serialized frame out to a room-member snapshot.
///
/// Pure with respect to registry and room state: it only reads, and reports
/// the repairs it could not observe-and-fix itself. Eligibility per
/// recipient: an absent or sentinel event needs the `"signal:all"`
/// subscription, a concrete event matches its own name or the wildcard. The
/// sender never receives its own publish, and a failure for one recipient
/// never aborts delivery to the rest.
pub fn fan_out(
    registry: &Registry,
    members: &[ConnectionId],
    sender: &ConnectionId,
    event: Option<&str>,
    frame: &Arc<str>,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for member in members {
        if member == sender {
            continue;
        }
        let Some(recipient) = registry.get(member) else {
            outcome.stale.push(member.clone());
            continue;
        };
        if !recipient.wants(event) {
            continue;
        }
        match recipient.send(Arc::clone(frame)) {
            SendResult::Sent => outcome.delivered += 1,
            SendResult::Dropped => {
                debug!(connection = %member, "send queue full, frame dropped");
            }
            SendResult::Closed => outcome.closed.push(member.clone()),
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::testing::ChannelSink;
    use roomcast_core::EVENT_ALL;
    use tokio::sync::mpsc;

    fn register(
        registry: &Registry,
        events: &[&str],
    ) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let (sink, rx) = ChannelSink::new(8);
        let conn = Arc::new(Connection::new(None, sink));
        for event in events {
            conn.subscribe(event);
        }
        let id = conn.id.clone();
        registry.insert(conn);
        (id, rx)
    }

    #[test]
    fn sender_excluded() {
        let registry = Registry::new();
        let (sender, mut sender_rx) = register(&registry, &[EVENT_ALL]);
        let (peer, mut peer_rx) = register(&registry, &[EVENT_ALL]);

        let members = vec![sender.clone(), peer];
        let outcome = fan_out(&registry, &members, &sender, None, &Arc::from("m"));

        assert_eq!(outcome.delivered, 1);
        assert!(sender_rx.try_recv().is_err());
        assert!(peer_rx.try_recv().is_ok());
    }

    #[test]
    fn wildcard_receives_concrete_events() {
        let registry = Registry::new();
        let (sender, _srx) = register(&registry, &[]);
        let (_all, mut all_rx) = register(&registry, &[EVENT_ALL]);
        let (_offer, mut offer_rx) = register(&registry, &["signal:offer"]);
        let (_answer, mut answer_rx) = register(&registry, &["signal:answer"]);

        let members = registry.ids();
        let outcome = fan_out(
            &registry,
            &members,
            &sender,
            Some("signal:offer"),
            &Arc::from("m"),
        );

        assert_eq!(outcome.delivered, 2);
        assert!(all_rx.try_recv().is_ok());
        assert!(offer_rx.try_recv().is_ok());
        assert!(answer_rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_needs_wildcard() {
        let registry = Registry::new();
        let (sender, _srx) = register(&registry, &[]);
        let (_specific, mut specific_rx) = register(&registry, &["signal:offer"]);

        let members = registry.ids();
        let outcome = fan_out(&registry, &members, &sender, None, &Arc::from("m"));

        assert_eq!(outcome.delivered, 0);
        assert!(specific_rx.try_recv().is_err());
    }

    #[test]
    fn stale_members_reported() {
        let registry = Registry::new();
        let (sender, _srx) = register(&registry, &[EVENT_ALL]);
        let ghost = ConnectionId::from("ghost");

        let members = vec![sender.clone(), ghost.clone()];
        let outcome = fan_out(&registry, &members, &sender, None, &Arc::from("m"));

        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.stale, vec![ghost]);
    }

    #[test]
    fn closed_sink_does_not_abort_rest() {
        let registry = Registry::new();
        let (sender, _srx) = register(&registry, &[]);
        let (dead, dead_rx) = register(&registry, &[EVENT_ALL]);
        drop(dead_rx);
        let (_live, mut live_rx) = register(&registry, &[EVENT_ALL]);

        let members = registry.ids();
        let outcome = fan_out(&registry, &members, &sender, None, &Arc::from("m"));

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.closed, vec![dead]);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn dropped_frames_count_as_undelivered() {
        let registry = Registry::new();
        let (sender, _srx) = register(&registry, &[]);
        let (sink, _rx) = ChannelSink::new(1);
        let slow = Arc::new(Connection::new(None, sink));
        slow.subscribe(EVENT_ALL);
        let slow_id = slow.id.clone();
        registry.insert(slow.clone());
        // Fill the queue so the next frame drops.
        assert_eq!(slow.send(Arc::from("backlog")), SendResult::Sent);

        let members = vec![sender.clone(), slow_id];
        let outcome = fan_out(&registry, &members, &sender, None, &Arc::from("m"));

        assert_eq!(outcome.delivered, 0);
        assert!(outcome.closed.is_empty());
        assert_eq!(slow.dropped_frames.load(std::sync::atomic::Ordering::Relaxed), 1);
    }
}
