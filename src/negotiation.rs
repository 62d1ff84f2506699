//! Media Negotiation Queue (§4.3)
//!
//! A strictly serial chain of peer-connection operations per session, so
//! at most one `createOffer`/`createAnswer`/`setLocalDescription`/
//! `setRemoteDescription` is ever in flight (§3, §5, testable property 3).
//!
//! `tokio::sync::Mutex` is documented as FIFO-fair, so acquiring it before
//! every operation both serializes access and preserves enqueue order —
//! the single-consumer task queue design note in §9 without needing an
//! explicit channel + worker.

use crate::media::{IceGatheringState, MediaEngineError, PeerConnection, SdpKind, SessionDescription};
use crate::observer::{IceReadiness, SessionObserver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

pub struct NegotiationQueue {
    pc: Arc<dyn PeerConnection>,
    observer: Arc<dyn SessionObserver>,
    serial: Mutex<()>,
    /// Cleared before scheduling a new local-description step, set once
    /// ICE gathering reaches readiness (§3 `rtc_ready`).
    rtc_ready: AtomicBool,
    ice_ready: AtomicBool,
    ice_notify: Notify,
}

impl NegotiationQueue {
    pub fn new(pc: Arc<dyn PeerConnection>, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            pc,
            observer,
            serial: Mutex::new(()),
            rtc_ready: AtomicBool::new(false),
            ice_ready: AtomicBool::new(false),
            ice_notify: Notify::new(),
        }
    }

    pub fn rtc_ready(&self) -> bool {
        self.rtc_ready.load(Ordering::SeqCst)
    }

    /// The peer connection's current local description, if any — used to
    /// resend an unchanged offer (e.g. a 422 Session Interval Too Small
    /// retry) without renegotiating media (§4.4).
    pub fn local_sdp(&self) -> Option<String> {
        self.pc.local_description_sdp()
    }

    /// Deliver a trickled ICE candidate (or `None` for end-of-candidates)
    /// to the queue while it's waiting for local-description readiness.
    /// The first of {gathering complete, explicit `ready()`, null
    /// candidate} wins (§4.3).
    pub async fn notify_ice_candidate(&self, session_id: &str, candidate: Option<&str>) {
        let decision = self.observer.on_icecandidate(session_id, candidate).await;
        if candidate.is_none() || decision == IceReadiness::ReadyNow {
            self.mark_ice_ready();
        }
    }

    fn mark_ice_ready(&self) {
        self.ice_ready.store(true, Ordering::SeqCst);
        self.ice_notify.notify_waiters();
    }

    /// `createOffer` (§4.3, §6).
    pub async fn create_offer(&self) -> Result<String, MediaEngineError> {
        let _guard = self.serial.lock().await;
        self.rtc_ready.store(false, Ordering::SeqCst);
        self.pc.create_offer().await
    }

    /// `createAnswer` (§4.3, §6).
    pub async fn create_answer(&self) -> Result<String, MediaEngineError> {
        let _guard = self.serial.lock().await;
        self.rtc_ready.store(false, Ordering::SeqCst);
        self.pc.create_answer().await
    }

    /// `setRemoteDescription` (§4.3, §6). Does not affect `rtc_ready` —
    /// only local-description application gates readiness (§3).
    pub async fn set_remote_description(&self, sdp: String, kind: SdpKind) -> Result<(), MediaEngineError> {
        let _guard = self.serial.lock().await;
        self.pc.set_remote_description(SessionDescription { kind, sdp }).await
    }

    /// `setLocalDescription` followed by the ICE-gathering wait, yielding
    /// the (possibly subscriber-mutated) local SDP once ready (§4.3).
    pub async fn set_local_description_and_await_ready(
        &self,
        session_id: &str,
        sdp: String,
        kind: SdpKind,
    ) -> Result<String, MediaEngineError> {
        let _guard = self.serial.lock().await;
        self.rtc_ready.store(false, Ordering::SeqCst);
        self.ice_ready.store(false, Ordering::SeqCst);

        self.pc.set_local_description(SessionDescription { kind, sdp }).await?;

        // Synchronous completion: some engines finish gathering before
        // setLocalDescription even returns (§4.3).
        if self.pc.ice_gathering_state() == IceGatheringState::Complete {
            self.mark_ice_ready();
        }

        while !self.ice_ready.load(Ordering::SeqCst) {
            if self.pc.ice_gathering_state() == IceGatheringState::Complete {
                self.mark_ice_ready();
                break;
            }
            self.ice_notify.notified().await;
        }

        self.rtc_ready.store(true, Ordering::SeqCst);

        let local_sdp = self.pc.local_description_sdp().ok_or_else(|| {
            MediaEngineError::new("peer connection reported no local description after gathering completed")
        })?;
        Ok(self.observer.on_sdp(session_id, local_sdp).await)
    }
}
