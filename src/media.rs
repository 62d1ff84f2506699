//! The peer-connection contract consumed by the negotiation queue (§6).
//!
//! The media engine itself is out of scope (§1); this module only defines
//! the abstract interface the session core drives it through, mirroring
//! how the grounding crate treats `rvoip-media-core` as a collaborator
//! behind `MediaManager` rather than inlining codec/RTP logic here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Mirrors the WebRTC `RTCSdpType` offer/answer distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A local or remote session description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

/// `RTCPeerConnection.signalingState`, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
}

/// `RTCPeerConnection.iceGatheringState`, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

/// A trickled ICE candidate, or `None` for the end-of-candidates marker.
pub type IceCandidate = Option<String>;

/// Abstract peer-connection engine. One instance is exclusively owned by a
/// single session (§5: "the peer connection is exclusively owned by the
/// session").
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<String, MediaEngineError>;
    async fn create_answer(&self) -> Result<String, MediaEngineError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MediaEngineError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MediaEngineError>;

    fn signaling_state(&self) -> SignalingState;
    fn ice_gathering_state(&self) -> IceGatheringState;
    fn local_description_sdp(&self) -> Option<String>;
}

/// Failure from a peer-connection operation; mapped to the
/// `peerconnection:*` event family (§6) by the negotiation queue.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct MediaEngineError {
    pub message: String,
}

impl MediaEngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Which peer-connection operation a `peerconnection:*failed` event refers
/// to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionOp {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
}

impl PeerConnectionOp {
    pub fn event_name(self) -> &'static str {
        match self {
            PeerConnectionOp::CreateOffer => "peerconnection:createofferfailed",
            PeerConnectionOp::CreateAnswer => "peerconnection:createanswerfailed",
            PeerConnectionOp::SetLocalDescription => "peerconnection:setlocaldescriptionfailed",
            PeerConnectionOp::SetRemoteDescription => "peerconnection:setremotedescriptionfailed",
        }
    }
}
