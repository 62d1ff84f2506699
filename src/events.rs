//! Event Bus (§4.5) — typed publish/subscribe for session lifecycle events.
//!
//! Grounded on the grounding crate's `SessionEventProcessor`
//! (`manager/events.rs`): a `tokio::sync::broadcast` channel wrapped so
//! publishing never blocks on a slow/absent subscriber.

use crate::causes::Cause;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Which side originated a transition, per JsSIP-style `originator`
/// tagging used throughout §4.1 (e.g. `failed(local, CANCELED)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Originator {
    Local,
    Remote,
    System,
}

/// Every event named in §6's event surface, one variant per name, with a
/// fixed payload schema declared once (design note in §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    NewRtcSession { session_id: String, originator: Originator },
    Connecting { session_id: String },
    Progress { session_id: String, originator: Originator, status_code: u16 },
    Accepted { session_id: String, originator: Originator },
    Confirmed { session_id: String, originator: Originator },
    Ended { session_id: String, originator: Originator, cause: Cause },
    Failed { session_id: String, originator: Originator, cause: Cause },
    AckReceived { session_id: String },
    ByeReceived { session_id: String },
    NewDtmf { session_id: String, tone: char },
    NewInfo { session_id: String, content_type: String },
    PeerConnectionError { session_id: String, op: &'static str, message: String },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::NewRtcSession { session_id, .. }
            | SessionEvent::Connecting { session_id }
            | SessionEvent::Progress { session_id, .. }
            | SessionEvent::Accepted { session_id, .. }
            | SessionEvent::Confirmed { session_id, .. }
            | SessionEvent::Ended { session_id, .. }
            | SessionEvent::Failed { session_id, .. }
            | SessionEvent::AckReceived { session_id }
            | SessionEvent::ByeReceived { session_id }
            | SessionEvent::NewDtmf { session_id, .. }
            | SessionEvent::NewInfo { session_id, .. }
            | SessionEvent::PeerConnectionError { session_id, .. } => session_id,
        }
    }
}

/// A subscriber handle for a `SessionEventBus`.
pub struct SessionEventSubscriber {
    receiver: broadcast::Receiver<SessionEvent>,
}

impl SessionEventSubscriber {
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                // A slow subscriber skipped events rather than blocking the
                // publisher; keep draining rather than surfacing a gap as
                // an error.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Publish/subscribe surface for session lifecycle events. Publishing
/// never blocks and never fails when there are no subscribers (§4.5 —
/// events still "happen" even if nobody is listening).
#[derive(Clone)]
pub struct SessionEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    pub fn subscribe(&self) -> SessionEventSubscriber {
        SessionEventSubscriber { receiver: self.sender.subscribe() }
    }

    pub fn publish(&self, event: SessionEvent) {
        tracing::debug!(event = ?event, "emit");
        // Err means no subscribers; that's a legitimate state, not a fault.
        let _ = self.sender.send(event);
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = SessionEventBus::new();
        bus.publish(SessionEvent::Connecting { session_id: "s1".into() });
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let bus = SessionEventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(SessionEvent::Connecting { session_id: "s1".into() });
        bus.publish(SessionEvent::AckReceived { session_id: "s1".into() });
        assert!(matches!(sub.recv().await, Some(SessionEvent::Connecting { .. })));
        assert!(matches!(sub.recv().await, Some(SessionEvent::AckReceived { .. })));
    }
}
