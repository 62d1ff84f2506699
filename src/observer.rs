//! Synchronous interception points.
//!
//! A handful of events in §4.1/§4.3 are not fire-and-forget notifications:
//! a subscriber can mutate the outgoing request body (`sending`), mutate
//! the local SDP before it's sent (`sdp`), force early SDP readiness from
//! an `icecandidate` callback, or veto an incoming re-INVITE/UPDATE
//! (`reject()`). A multi-consumer broadcast channel can't model a
//! synchronous reply, so these go through a single `SessionObserver`
//! instead of the fire-and-forget `SessionEventBus`.
//!
//! Every method has a neutral default so a session with no observer
//! attached behaves exactly as if nothing were subscribed.

use crate::transport::OutgoingRequest;
use async_trait::async_trait;

/// Outcome of an `icecandidate` callback: either keep waiting for more
/// candidates/gathering completion, or force the local description ready
/// now (§4.3: "the first of {gathering complete, explicit ready, null
/// candidate} wins").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceReadiness {
    Continue,
    ReadyNow,
}

/// Outcome of a `reinvite`/`update` callback (§4.3).
#[derive(Debug, Clone)]
pub enum ReinviteDecision {
    Accept,
    Reject { status_code: u16, reason_phrase: String },
}

#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Allows mutating the outgoing INVITE body in place before it is
    /// handed to the transport (§4.1 `connect`: "sending ... allowing the
    /// subscriber to mutate body in place").
    async fn on_sending(&self, _session_id: &str, _request: &mut OutgoingRequest) {}

    /// Allows mutating the local SDP before it becomes available to the
    /// caller (§4.3: "subscribers may mutate it").
    async fn on_sdp(&self, _session_id: &str, sdp: String) -> String {
        sdp
    }

    /// Called once per trickled ICE candidate (or `None` for the
    /// end-of-candidates marker) while waiting on gathering (§4.3).
    async fn on_icecandidate(&self, _session_id: &str, candidate: Option<&str>) -> IceReadiness {
        if candidate.is_none() {
            IceReadiness::ReadyNow
        } else {
            IceReadiness::Continue
        }
    }

    /// Called for an incoming re-INVITE or UPDATE; returning `Reject`
    /// answers it with the given status instead of renegotiating (§4.3).
    async fn on_reinvite(&self, _session_id: &str) -> ReinviteDecision {
        ReinviteDecision::Accept
    }

    async fn on_update(&self, _session_id: &str) -> ReinviteDecision {
        ReinviteDecision::Accept
    }

    /// Allows a subscriber to append headers to a 200 OK for an inbound
    /// BYE (§4.1 `byeReceived`: "allowing subscriber to append response
    /// headers").
    async fn on_bye_received(&self, _session_id: &str, _response: &mut crate::transport::OutgoingResponse) {}
}

/// The observer used when nobody supplies one: every hook is a no-op /
/// accepts everything.
pub struct NullObserver;

#[async_trait]
impl SessionObserver for NullObserver {}
