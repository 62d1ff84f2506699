//! Shared fakes for scenario tests: a trivial peer connection and a
//! transport that just records what was sent.

use async_trait::async_trait;
use sip_session_core::media::{IceGatheringState, MediaEngineError, PeerConnection, SessionDescription, SignalingState};
use sip_session_core::transport::{OutgoingRequest, OutgoingResponse, SipTransport, TransportError};
use std::sync::Mutex;

pub struct FakePeerConnection {
    gathering: Mutex<IceGatheringState>,
    local_sdp: Mutex<Option<String>>,
}

impl FakePeerConnection {
    pub fn new() -> Self {
        Self { gathering: Mutex::new(IceGatheringState::Complete), local_sdp: Mutex::new(None) }
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn create_offer(&self) -> Result<String, MediaEngineError> {
        Ok("v=0\r\no=- offer\r\n".into())
    }
    async fn create_answer(&self) -> Result<String, MediaEngineError> {
        Ok("v=0\r\no=- answer\r\n".into())
    }
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MediaEngineError> {
        *self.local_sdp.lock().unwrap() = Some(desc.sdp);
        Ok(())
    }
    async fn set_remote_description(&self, _desc: SessionDescription) -> Result<(), MediaEngineError> {
        Ok(())
    }
    fn signaling_state(&self) -> SignalingState {
        SignalingState::Stable
    }
    fn ice_gathering_state(&self) -> IceGatheringState {
        *self.gathering.lock().unwrap()
    }
    fn local_description_sdp(&self) -> Option<String> {
        self.local_sdp.lock().unwrap().clone()
    }
}

pub struct RecordingTransport {
    pub requests: Mutex<Vec<OutgoingRequest>>,
    pub responses: Mutex<Vec<OutgoingResponse>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self { requests: Mutex::new(Vec::new()), responses: Mutex::new(Vec::new()) }
    }

    pub fn sent_methods(&self) -> Vec<rsip::Method> {
        self.requests.lock().unwrap().iter().map(|r| r.method).collect()
    }

    pub fn sent_statuses(&self) -> Vec<u16> {
        self.responses.lock().unwrap().iter().map(|r| r.status_code).collect()
    }
}

#[async_trait]
impl SipTransport for RecordingTransport {
    async fn send_request(&self, request: OutgoingRequest) -> Result<(), TransportError> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
    async fn send_response(&self, response: OutgoingResponse) -> Result<(), TransportError> {
        self.responses.lock().unwrap().push(response);
        Ok(())
    }
}
