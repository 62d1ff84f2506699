//! Session State Machine (§4.1) — the `SipSession` facade tying the
//! dialog registry, negotiation queue, timer manager, and event bus
//! together behind the public operations and inbound dispatch.

use super::dtmf::{self, DtmfTone};
use super::{CancelIntent, Direction, Session, SessionStatus, SessionTimerState};
use crate::causes::{cause_from_status, status_for_cause, Cause};
use crate::config::{RefreshMethod, SessionConfig};
use crate::dialog::{Dialog, DialogId, DialogState};
use crate::errors::{Result, SessionError};
use crate::events::{Originator, SessionEvent, SessionEventBus, SessionEventSubscriber};
use crate::identity::{generate_tag, SipAddress};
use crate::media::{MediaEngineError, PeerConnection, PeerConnectionOp, SdpKind};
use crate::negotiation::NegotiationQueue;
use crate::observer::{ReinviteDecision, SessionObserver};
use crate::timers::TimerManager;
use crate::transport::{OutgoingRequest, OutgoingResponse, SipTransport};
use rsip::Method;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Minimal view of an inbound request the transport/transaction layer
/// hands to the session core (§1: message parsing is out of scope; the
/// caller has already extracted the fields the state machine needs).
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    pub call_id: String,
    /// The request's `From` tag — the remote party's tag from this
    /// session's point of view.
    pub remote_tag: String,
    /// The request's `To` tag, if present (set once this side has
    /// replied at least once).
    pub local_tag: Option<String>,
    pub cseq: u32,
    pub contact: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
    /// `(expires, refresh_method, refresher_is_peer)` decoded from an
    /// incoming `Session-Expires` header, if present (§4.4).
    pub session_expires: Option<(u32, RefreshMethod, bool)>,
}

/// Minimal view of an inbound response to our own INVITE/re-INVITE/UPDATE.
#[derive(Debug, Clone)]
pub struct IncomingResponse {
    pub status_code: u16,
    pub reason_phrase: Option<String>,
    pub call_id: String,
    pub from_tag: String,
    pub to_tag: Option<String>,
    pub contact: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
    pub session_expires: Option<(u32, RefreshMethod, bool)>,
    /// `Min-SE` header value on a 422 Session Interval Too Small response
    /// (RFC 4028 §3), `None` otherwise.
    pub min_se: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub extra_headers: Vec<rsip::Header>,
    /// RFC 3323: send an anonymous `From` and carry the real identity in
    /// `P-Preferred-Identity` with `Privacy: id`.
    pub anonymous: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    pub extra_headers: Vec<rsip::Header>,
}

#[derive(Debug, Clone, Default)]
pub struct TerminateOptions {
    pub status_code: Option<u16>,
    pub reason_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DtmfOptions {
    pub duration: std::time::Duration,
    pub inter_tone_gap: std::time::Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RenegotiateOptions {
    pub use_update: bool,
}

/// The INVITE dialog state machine (§2 component 1). One instance per
/// call attempt, shared behind an `Arc` so timers and the DTMF runner can
/// hold their own handle back to it.
pub struct SipSession {
    state: Mutex<Session>,
    transport: Arc<dyn SipTransport>,
    negotiation: NegotiationQueue,
    events: SessionEventBus,
    observer: Arc<dyn SessionObserver>,
    timers: Mutex<TimerManager>,
    config: SessionConfig,
    dtmf_queue: Mutex<VecDeque<DtmfTone>>,
    dtmf_running: AtomicBool,
}

impl SipSession {
    fn new(
        direction: Direction,
        call_id: String,
        local_tag: String,
        local_identity: SipAddress,
        remote_identity: SipAddress,
        contact: String,
        transport: Arc<dyn SipTransport>,
        peer_connection: Arc<dyn PeerConnection>,
        observer: Arc<dyn SessionObserver>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let timer_state =
            SessionTimerState::new(config.session_timers, config.session_timers_refresh_method, config.session_expires);
        let session = Session::new(direction, call_id, local_tag, local_identity, remote_identity, contact, timer_state);
        Arc::new(Self {
            state: Mutex::new(session),
            transport,
            negotiation: NegotiationQueue::new(peer_connection, observer.clone()),
            events: SessionEventBus::new(),
            observer,
            timers: Mutex::new(TimerManager::new()),
            config,
            dtmf_queue: Mutex::new(VecDeque::new()),
            dtmf_running: AtomicBool::new(false),
        })
    }

    /// Build a UAC session about to place an outgoing call (§4.1 `connect`).
    #[allow(clippy::too_many_arguments)]
    pub fn new_outgoing(
        local_identity: SipAddress,
        remote_identity: SipAddress,
        contact: String,
        transport: Arc<dyn SipTransport>,
        peer_connection: Arc<dyn PeerConnection>,
        observer: Arc<dyn SessionObserver>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let call_id = uuid::Uuid::new_v4().to_string();
        let local_tag = generate_tag();
        Self::new(
            Direction::Outgoing,
            call_id,
            local_tag,
            local_identity,
            remote_identity,
            contact,
            transport,
            peer_connection,
            observer,
            config,
        )
    }

    /// Build a UAS session for a just-arrived INVITE (§4.1 `answer`,
    /// §9 open question on the inbound path: symmetric with the outbound
    /// `answer` flow). `initial_offer` is the INVITE's body, if any — its
    /// absence puts the session in late-SDP mode from the start, same as
    /// a bodyless re-INVITE (§4.3, glossary "Late SDP").
    #[allow(clippy::too_many_arguments)]
    pub async fn new_incoming(
        call_id: String,
        remote_tag: String,
        local_identity: SipAddress,
        remote_identity: SipAddress,
        contact: String,
        initial_offer: Option<String>,
        initial_session_expires: Option<(u32, RefreshMethod, bool)>,
        transport: Arc<dyn SipTransport>,
        peer_connection: Arc<dyn PeerConnection>,
        observer: Arc<dyn SessionObserver>,
        config: SessionConfig,
    ) -> Arc<Self> {
        // `remote_tag` is the peer's From-tag; our own local tag (the
        // To-tag we'll send back) is generated now so the session id is
        // stable from construction. `Session::new`'s constructor seeds
        // `from_tag` with whatever tag it's given, which is only correct
        // for a UAC's own tag — for a UAS we fix up `to_tag`/`id` right
        // after construction instead.
        let local_tag = generate_tag();
        let session = Self::new(
            Direction::Incoming,
            call_id,
            remote_tag,
            local_identity,
            remote_identity,
            contact,
            transport,
            peer_connection,
            observer,
            config,
        );
        {
            let mut inner = session.state.try_lock().expect("uncontended at construction");
            let call_id = inner.call_id.clone();
            inner.to_tag = Some(local_tag.clone());
            inner.id = crate::identity::session_id(&call_id, &local_tag);
        }

        let late_sdp = match initial_offer {
            Some(sdp) => {
                let _ = session.negotiation.set_remote_description(sdp, SdpKind::Offer).await;
                false
            }
            None => true,
        };
        session.negotiate_session_timer_from_request(initial_session_expires).await;
        {
            let mut inner = session.state.lock().await;
            inner.late_sdp = late_sdp;
            inner.transition(SessionStatus::WaitingForAnswer);
        }
        session.arm_no_answer_timer().await;
        session
    }

    // -- read-only accessors (§6 user API surface) --------------------

    pub async fn id(&self) -> String {
        self.state.lock().await.id.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    pub async fn direction(&self) -> Direction {
        self.state.lock().await.direction
    }

    pub async fn local_identity(&self) -> SipAddress {
        self.state.lock().await.local_identity.clone()
    }

    pub async fn remote_identity(&self) -> SipAddress {
        self.state.lock().await.remote_identity.clone()
    }

    pub async fn start_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.state.lock().await.start_time
    }

    pub async fn end_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.state.lock().await.end_time
    }

    pub async fn contact(&self) -> String {
        self.state.lock().await.contact.clone()
    }

    pub async fn set_data(&self, data: Box<dyn Any + Send + Sync>) {
        self.state.lock().await.data = Some(data);
    }

    pub fn subscribe(&self) -> SessionEventSubscriber {
        self.events.subscribe()
    }

    /// Deliver a trickled ICE candidate (or `None` for the end-of-candidates
    /// marker) to the negotiation queue. Without a caller reaching this, a
    /// peer connection whose gathering doesn't complete synchronously would
    /// leave `set_local_description_and_await_ready` waiting forever (§4.3).
    pub async fn notify_ice_candidate(&self, candidate: Option<&str>) {
        let session_id = self.state.lock().await.id.clone();
        self.negotiation.notify_ice_candidate(&session_id, candidate).await;
    }

    // -- public operations (§4.1) --------------------------------------

    /// `connect(target, sdp, options)`: NULL → INVITE_SENT.
    pub async fn connect(self: &Arc<Self>, options: ConnectOptions) -> Result<()> {
        {
            let session = self.state.lock().await;
            if session.status != SessionStatus::Null {
                return Err(SessionError::invalid_state(session.status));
            }
        }
        let (session_id, from_addr, to_addr, contact) = {
            let session = self.state.lock().await;
            (session.id.clone(), session.local_identity.clone(), session.remote_identity.clone(), session.contact.clone())
        };
        self.events.publish(SessionEvent::NewRtcSession { session_id: session_id.clone(), originator: Originator::Local });

        let offer_sdp = self.negotiation.create_offer().await.map_err(|e| self.media_failure(PeerConnectionOp::CreateOffer, e))?;
        let offer_sdp = self
            .negotiation
            .set_local_description_and_await_ready(&session_id, offer_sdp, SdpKind::Offer)
            .await
            .map_err(|e| self.media_failure(PeerConnectionOp::SetLocalDescription, e))?;

        let mut request = OutgoingRequest::new(Method::Invite)
            .with_body("application/sdp", offer_sdp.into_bytes())
            .with_header(rsip::Header::Contact(contact.into()));
        if self.config.session_timers {
            request = request
                .with_header(rsip::Header::Other(
                    "Session-Expires".into(),
                    format!("{};refresher=uac", self.config.session_expires),
                ))
                .with_header(self.min_se_header());
        }
        if options.anonymous {
            let anonymous_from: rsip::headers::From = "\"Anonymous\" <sip:anonymous@anonymous.invalid>".into();
            request = request
                .with_header(rsip::Header::From(anonymous_from))
                .with_header(rsip::Header::Other("Privacy".into(), "id".into()))
                .with_header(rsip::Header::Other("P-Preferred-Identity".into(), format!("<{}>", from_addr.uri)));
        }
        for header in options.extra_headers {
            request = request.with_header(header);
        }
        let _ = &to_addr; // the remote URI is embedded by the transport/dialer layer

        {
            let mut session = self.state.lock().await;
            session.transition(SessionStatus::InviteSent);
        }
        self.events.publish(SessionEvent::Connecting { session_id: session_id.clone() });
        self.observer.on_sending(&session_id, &mut request).await;
        self.transport.send_request(request).await.map_err(|e| SessionError::Transport { message: e.message })?;
        Ok(())
    }

    /// `answer(sdp, options)`: WAITING_FOR_ANSWER → WAITING_FOR_ACK. In
    /// late-SDP mode (no offer in the original INVITE) this generates a
    /// fresh offer instead of an answer; the remote answer arrives in the
    /// ACK (§4.1 `ACK` handling, glossary "Late SDP").
    pub async fn answer(self: &Arc<Self>, _options: AnswerOptions) -> Result<()> {
        let (session_id, late_sdp) = {
            let session = self.state.lock().await;
            if session.status != SessionStatus::WaitingForAnswer {
                return Err(SessionError::invalid_state(session.status));
            }
            (session.id.clone(), session.late_sdp)
        };

        let (answer_sdp, kind) = if late_sdp {
            let sdp = self.negotiation.create_offer().await.map_err(|e| self.media_failure(PeerConnectionOp::CreateOffer, e))?;
            (sdp, SdpKind::Offer)
        } else {
            let sdp =
                self.negotiation.create_answer().await.map_err(|e| self.media_failure(PeerConnectionOp::CreateAnswer, e))?;
            (sdp, SdpKind::Answer)
        };
        let answer_sdp = self
            .negotiation
            .set_local_description_and_await_ready(&session_id, answer_sdp, kind)
            .await
            .map_err(|e| self.media_failure(PeerConnectionOp::SetLocalDescription, e))?;

        let contact = {
            let mut session = self.state.lock().await;
            session.transition(SessionStatus::WaitingForAck);
            session.contact.clone()
        };
        let mut response = OutgoingResponse::new(200)
            .with_body("application/sdp", answer_sdp.into_bytes())
            .with_header(rsip::Header::Contact(contact.into()));
        if let Some(header) = self.session_expires_header().await {
            response = response.with_header(header).with_header(self.min_se_header());
        }
        self.timers.lock().await.cancel_no_answer();
        self.transport.send_response(response).await.map_err(|e| SessionError::Transport { message: e.message })?;
        self.arm_ack_timers(false).await;
        self.arm_session_timers().await;
        Ok(())
    }

    /// `terminate(options)` (§4.1): behavior depends on current status.
    pub async fn terminate(self: &Arc<Self>, options: TerminateOptions) -> Result<()> {
        if let Some(code) = options.status_code {
            if !(200..=699).contains(&code) {
                return Err(SessionError::invalid_argument(format!("status_code {code} out of [200,699]")));
            }
        }
        let (status, session_id) = {
            let session = self.state.lock().await;
            (session.status, session.id.clone())
        };
        if status.is_terminal() {
            return Err(SessionError::invalid_state(status));
        }

        match status {
            SessionStatus::Null | SessionStatus::InviteSent => {
                let mut session = self.state.lock().await;
                session.cancel_intent = CancelIntent { canceled: true, reason: options.reason_text };
                Ok(())
            }
            SessionStatus::OneXxReceived => {
                self.send_cancel(options.reason_text).await?;
                let mut session = self.state.lock().await;
                session.transition(SessionStatus::Canceled);
                drop(session);
                self.fire_failed(&session_id, Originator::Local, Cause::Canceled).await;
                Ok(())
            }
            SessionStatus::WaitingForAck | SessionStatus::Confirmed => {
                self.disarm_all().await;
                let reason_header = options.reason_text.clone();
                let mut request = OutgoingRequest::new(Method::Bye);
                if let Some(text) = reason_header {
                    request = request.with_header(rsip::Header::Other("Reason".into(), format!("SIP ;cause=200 ;text=\"{text}\"")));
                }
                self.transport.send_request(request).await.map_err(|e| SessionError::Transport { message: e.message })?;
                let mut session = self.state.lock().await;
                session.transition(SessionStatus::Terminated);
                session.end_time = Some(chrono::Utc::now());
                let fire = session.fire_terminal_once();
                session.dialogs.close_all();
                drop(session);
                if fire {
                    self.events.publish(SessionEvent::Ended { session_id, originator: Originator::Local, cause: Cause::Bye });
                }
                Ok(())
            }
            SessionStatus::InviteReceived | SessionStatus::WaitingForAnswer | SessionStatus::Answered => {
                let mut session = self.state.lock().await;
                session.cancel_intent = CancelIntent { canceled: true, reason: options.reason_text };
                Ok(())
            }
            SessionStatus::Canceled | SessionStatus::Terminated => unreachable!("guarded above"),
        }
    }

    /// `sendDTMF(tones, options)` (§4.1): queues tones, running the send
    /// loop if it isn't already active.
    pub async fn send_dtmf(self: &Arc<Self>, tones: &str, options: DtmfOptions) -> Result<()> {
        {
            let session = self.state.lock().await;
            if !matches!(session.status, SessionStatus::Confirmed | SessionStatus::WaitingForAck) {
                return Err(SessionError::invalid_state(session.status));
            }
        }
        dtmf::validate_tones(tones)?;
        let plan = dtmf::expand_tones(
            tones,
            options.duration,
            options.inter_tone_gap,
            self.config.dtmf_comma_pause,
            self.config.dtmf_min_duration,
            self.config.dtmf_max_duration,
            self.config.dtmf_min_duration,
        );
        {
            let mut queue = self.dtmf_queue.lock().await;
            queue.extend(plan);
        }
        if self.dtmf_running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            let this = self.clone();
            tokio::spawn(async move { this.run_dtmf_queue().await });
        }
        Ok(())
    }

    async fn run_dtmf_queue(self: Arc<Self>) {
        loop {
            let next = self.dtmf_queue.lock().await.pop_front();
            let Some(tone) = next else {
                self.dtmf_running.store(false, Ordering::SeqCst);
                return;
            };
            if tone.tone != ',' {
                let request = OutgoingRequest::new(Method::Info).with_body(
                    "application/dtmf-relay",
                    format!("Signal={}\r\nDuration={}\r\n", tone.tone, tone.duration.as_millis()).into_bytes(),
                );
                if self.transport.send_request(request).await.is_err() {
                    // §4.1: "on send failure, the remaining queue is dropped".
                    self.dtmf_queue.lock().await.clear();
                    self.dtmf_running.store(false, Ordering::SeqCst);
                    return;
                }
            }
            tokio::time::sleep(tone.inter_tone_gap).await;
        }
    }

    /// `sendInfo(contentType, body, options)` (§4.1).
    pub async fn send_info(&self, content_type: impl Into<String>, body: Vec<u8>) -> Result<()> {
        {
            let session = self.state.lock().await;
            if !matches!(session.status, SessionStatus::Confirmed | SessionStatus::WaitingForAck) {
                return Err(SessionError::invalid_state(session.status));
            }
        }
        let request = OutgoingRequest::new(Method::Info).with_body(content_type, body);
        self.transport.send_request(request).await.map_err(|e| SessionError::Transport { message: e.message })
    }

    /// Re-offer eligibility (§4.3): rtc_ready, a confirmed dialog exists,
    /// and neither side has a re-negotiation transaction outstanding.
    async fn reoffer_eligible(&self) -> bool {
        if !self.negotiation.rtc_ready() {
            return false;
        }
        let session = self.state.lock().await;
        match session.dialogs.confirmed() {
            Some(dialog) => !dialog.uac_pending_reply && !dialog.uas_pending_reply,
            None => false,
        }
    }

    /// `renegotiate(options)` (§4.1, §4.3, testable property / scenario S5).
    pub async fn renegotiate(self: &Arc<Self>, options: RenegotiateOptions) -> bool {
        if !self.reoffer_eligible().await {
            return false;
        }
        let session_id = self.state.lock().await.id.clone();
        let offer = match self.negotiation.create_offer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                self.media_failure(PeerConnectionOp::CreateOffer, e);
                self.terminate_with_cause(&session_id, Cause::WebrtcError).await;
                return false;
            }
        };
        let offer = match self.negotiation.set_local_description_and_await_ready(&session_id, offer, SdpKind::Offer).await {
            Ok(sdp) => sdp,
            Err(e) => {
                self.media_failure(PeerConnectionOp::SetLocalDescription, e);
                self.terminate_with_cause(&session_id, Cause::WebrtcError).await;
                return false;
            }
        };

        let method = if options.use_update { Method::Update } else { Method::Invite };
        let mut request = OutgoingRequest::new(method).with_body("application/sdp", offer.into_bytes());
        if let Some(header) = self.session_expires_header().await {
            request = request.with_header(header).with_header(self.min_se_header());
        }
        {
            let mut session = self.state.lock().await;
            if let Some(dialog) = session.dialogs.confirmed_mut() {
                dialog.uac_pending_reply = true;
            }
        }
        if self.transport.send_request(request).await.is_err() {
            self.terminate_with_cause(&session_id, Cause::ConnectionError).await;
            return false;
        }
        true
    }

    /// `sendRequest(method, options)` (§4.1): proxy to the confirmed
    /// dialog.
    pub async fn send_request(&self, method: Method, options: ConnectOptions) -> Result<()> {
        let session = self.state.lock().await;
        if !session.dialogs.has_confirmed() {
            return Err(SessionError::Dialog { message: "no confirmed dialog".into() });
        }
        drop(session);
        let mut request = OutgoingRequest::new(method);
        for header in options.extra_headers {
            request = request.with_header(header);
        }
        self.transport.send_request(request).await.map_err(|e| SessionError::Transport { message: e.message })
    }

    // -- inbound dispatch (§4.1 receiveRequest) ------------------------

    pub async fn receive_request(self: &Arc<Self>, request: IncomingRequest) {
        match request.method {
            Method::Cancel => self.on_cancel_received().await,
            Method::Ack => self.on_ack_received(request).await,
            Method::Bye => self.on_bye_received(request).await,
            Method::Invite => self.on_reinvite_received(request, false).await,
            Method::Update => self.on_reinvite_received(request, true).await,
            Method::Info => self.on_info_received(request).await,
            _ => {
                let _ = self.transport.send_response(OutgoingResponse::new(501).with_reason("Not Implemented")).await;
            }
        }
    }

    async fn on_cancel_received(self: &Arc<Self>) {
        let session_id = {
            let session = self.state.lock().await;
            if !matches!(session.status, SessionStatus::WaitingForAnswer | SessionStatus::Answered) {
                return;
            }
            session.id.clone()
        };
        let _ = self.transport.send_response(OutgoingResponse::new(487).with_reason("Request Terminated")).await;
        self.timers.lock().await.cancel_no_answer();
        {
            let mut session = self.state.lock().await;
            session.transition(SessionStatus::Canceled);
        }
        self.fire_failed(&session_id, Originator::Remote, Cause::Canceled).await;
    }

    async fn on_ack_received(self: &Arc<Self>, request: IncomingRequest) {
        let session_id = self.state.lock().await.id.clone();
        self.events.publish(SessionEvent::AckReceived { session_id: session_id.clone() });
        {
            let session = self.state.lock().await;
            if session.status != SessionStatus::WaitingForAck {
                return;
            }
        }
        self.disarm_ack_timers().await;
        let late_sdp = self.state.lock().await.late_sdp;
        if late_sdp {
            let Some(body) = request.body else {
                self.terminate_with_status(&session_id, Cause::MissingSdp, 400).await;
                return;
            };
            let sdp = String::from_utf8_lossy(&body).into_owned();
            match self.negotiation.set_remote_description(sdp, SdpKind::Answer).await {
                Ok(()) => {
                    let mut session = self.state.lock().await;
                    session.transition(SessionStatus::Confirmed);
                    session.mark_confirmed();
                    drop(session);
                    self.events.publish(SessionEvent::Confirmed { session_id, originator: Originator::Remote });
                }
                Err(_) => self.terminate_with_status(&session_id, Cause::BadMediaDescription, 488).await,
            }
        } else {
            let mut session = self.state.lock().await;
            session.transition(SessionStatus::Confirmed);
            session.mark_confirmed();
            drop(session);
            self.events.publish(SessionEvent::Confirmed { session_id, originator: Originator::Remote });
        }
    }

    async fn on_bye_received(self: &Arc<Self>, _request: IncomingRequest) {
        let session_id = self.state.lock().await.id.clone();
        let status = self.state.lock().await.status;
        if !matches!(status, SessionStatus::Confirmed | SessionStatus::WaitingForAck) {
            let _ = self.transport.send_response(OutgoingResponse::new(403).with_reason("Wrong Status")).await;
            return;
        }
        self.events.publish(SessionEvent::ByeReceived { session_id: session_id.clone() });
        let mut response = OutgoingResponse::new(200);
        self.observer.on_bye_received(&session_id, &mut response).await;
        let _ = self.transport.send_response(response).await;
        self.disarm_all().await;
        let mut session = self.state.lock().await;
        session.transition(SessionStatus::Terminated);
        session.end_time = Some(chrono::Utc::now());
        let fire = session.fire_terminal_once();
        session.dialogs.close_all();
        drop(session);
        if fire {
            self.events.publish(SessionEvent::Ended { session_id, originator: Originator::Remote, cause: Cause::Bye });
        }
    }

    /// Incoming re-INVITE / UPDATE (§4.1, §4.3).
    async fn on_reinvite_received(self: &Arc<Self>, request: IncomingRequest, is_update: bool) {
        let session_id = {
            let session = self.state.lock().await;
            if session.status != SessionStatus::Confirmed {
                let _ = self.transport.send_response(OutgoingResponse::new(403).with_reason("Wrong Status")).await;
                return;
            }
            session.id.clone()
        };

        let decision = if is_update { self.observer.on_update(&session_id).await } else { self.observer.on_reinvite(&session_id).await };
        if let ReinviteDecision::Reject { status_code, reason_phrase } = decision {
            let _ = self.transport.send_response(OutgoingResponse::new(status_code).with_reason(reason_phrase)).await;
            return;
        }

        {
            let mut session = self.state.lock().await;
            if let Some(dialog) = session.dialogs.confirmed_mut() {
                dialog.uas_pending_reply = true;
            }
        }
        self.negotiate_session_timer_from_request(request.session_expires).await;
        if let Some(contact) = request.contact.as_deref() {
            if let Ok(uri) = rsip::Uri::try_from(contact) {
                let mut session = self.state.lock().await;
                if let Some(dialog) = session.dialogs.confirmed_mut() {
                    dialog.update_remote_target(uri);
                }
            }
        }

        let answer_sdp = match &request.body {
            None if !is_update => {
                // Late-SDP 200: we supply the offer, peer answers in ACK.
                self.state.lock().await.late_sdp = true;
                match self.negotiation.create_offer().await {
                    Ok(sdp) => Some(sdp),
                    Err(e) => {
                        self.media_failure(PeerConnectionOp::CreateOffer, e);
                        let _ = self.transport.send_response(OutgoingResponse::new(500)).await;
                        self.clear_uas_pending().await;
                        return;
                    }
                }
            }
            None => {
                let mut response = OutgoingResponse::new(200);
                if let Some(header) = self.session_expires_header().await {
                    response = response.with_header(header).with_header(self.min_se_header());
                }
                let _ = self.transport.send_response(response).await;
                self.clear_uas_pending().await;
                return;
            }
            Some(body) => {
                if request.content_type.as_deref() != Some("application/sdp") {
                    let _ = self.transport.send_response(OutgoingResponse::new(415)).await;
                    self.clear_uas_pending().await;
                    return;
                }
                let offer_sdp = String::from_utf8_lossy(&body).into_owned();
                if self.negotiation.set_remote_description(offer_sdp, SdpKind::Offer).await.is_err() {
                    let _ = self.transport.send_response(OutgoingResponse::new(488).with_reason("Not Acceptable Here")).await;
                    self.events.publish(SessionEvent::PeerConnectionError {
                        session_id: session_id.clone(),
                        op: PeerConnectionOp::SetRemoteDescription.event_name(),
                        message: "setRemoteDescription failed for incoming offer".into(),
                    });
                    self.clear_uas_pending().await;
                    return;
                }
                match self.negotiation.create_answer().await {
                    Ok(sdp) => Some(sdp),
                    Err(e) => {
                        self.media_failure(PeerConnectionOp::CreateAnswer, e);
                        let _ = self.transport.send_response(OutgoingResponse::new(500)).await;
                        self.clear_uas_pending().await;
                        return;
                    }
                }
            }
        };

        if let Some(sdp) = answer_sdp {
            let kind = if request.body.is_none() { SdpKind::Offer } else { SdpKind::Answer };
            let sdp = match self.negotiation.set_local_description_and_await_ready(&session_id, sdp, kind).await {
                Ok(sdp) => sdp,
                Err(e) => {
                    self.media_failure(PeerConnectionOp::SetLocalDescription, e);
                    let _ = self.transport.send_response(OutgoingResponse::new(500)).await;
                    self.clear_uas_pending().await;
                    return;
                }
            };
            let mut response = OutgoingResponse::new(200).with_body("application/sdp", sdp.into_bytes());
            if let Some(header) = self.session_expires_header().await {
                response = response.with_header(header).with_header(self.min_se_header());
            }
            let _ = self.transport.send_response(response).await;
        }
        self.clear_uas_pending().await;

        if !is_update {
            let mut session = self.state.lock().await;
            session.transition(SessionStatus::WaitingForAck);
            drop(session);
            self.arm_ack_timers(false).await;
        }
    }

    async fn clear_uas_pending(&self) {
        let mut session = self.state.lock().await;
        if let Some(dialog) = session.dialogs.confirmed_mut() {
            dialog.uas_pending_reply = false;
        }
    }

    async fn on_info_received(self: &Arc<Self>, request: IncomingRequest) {
        let session_id = {
            let session = self.state.lock().await;
            if !matches!(
                session.status,
                SessionStatus::OneXxReceived
                    | SessionStatus::WaitingForAnswer
                    | SessionStatus::Answered
                    | SessionStatus::WaitingForAck
                    | SessionStatus::Confirmed
            ) {
                return;
            }
            session.id.clone()
        };
        match request.content_type.as_deref() {
            Some(ct) if ct.starts_with("application/dtmf-relay") => {
                if let Some(body) = request.body {
                    if let Some(tone) = parse_dtmf_signal(&body) {
                        self.events.publish(SessionEvent::NewDtmf { session_id, tone });
                    }
                }
            }
            Some(ct) => {
                self.events.publish(SessionEvent::NewInfo { session_id, content_type: ct.to_string() });
            }
            None => {
                let _ = self.transport.send_response(OutgoingResponse::new(415)).await;
            }
        }
    }

    // -- outbound INVITE response handling (§4.1) ----------------------

    pub async fn receive_response(self: &Arc<Self>, response: IncomingResponse) {
        let (status, session_id, our_to_tag, our_from_tag) = {
            let session = self.state.lock().await;
            (session.status, session.id.clone(), session.to_tag.clone(), session.from_tag.clone())
        };

        // §4.1: once genuinely confirmed (not just awaiting our own ACK),
        // any further 2xx for the original INVITE is either a plain
        // retransmission, a losing forked branch, or — if our own
        // re-INVITE/UPDATE is outstanding — the reply to that transaction.
        if matches!(status, SessionStatus::WaitingForAck | SessionStatus::Confirmed) && response.status_code / 100 == 2 {
            let pending_reinvite = status == SessionStatus::Confirmed && {
                let session = self.state.lock().await;
                session.dialogs.confirmed().is_some_and(|d| d.uac_pending_reply)
            };
            if pending_reinvite {
                self.on_reinvite_or_update_response(response).await;
                return;
            }
            let matches_confirmed = our_to_tag.as_deref() == response.to_tag.as_deref();
            if matches_confirmed {
                let request = OutgoingRequest::new(Method::Ack);
                let _ = self.transport.send_request(request).await;
            } else {
                let ack = OutgoingRequest::new(Method::Ack);
                let _ = self.transport.send_request(ack).await;
                let bye = OutgoingRequest::new(Method::Bye);
                let _ = self.transport.send_request(bye).await;
            }
            return;
        }

        if status == SessionStatus::Confirmed {
            // A non-2xx final response to an outstanding re-INVITE/UPDATE
            // (e.g. 491 Request Pending); anything else is a stray
            // response with nothing pending and is ignored.
            self.on_reinvite_or_update_response(response).await;
            return;
        }

        if !matches!(status, SessionStatus::InviteSent | SessionStatus::OneXxReceived) {
            return;
        }

        let canceled = self.state.lock().await.cancel_intent.canceled;

        // §8 scenario S2: CANCEL is only sent once a 1xx (100 included)
        // shows up, and the session ends CANCELED/failed(local, CANCELED)
        // right away rather than waiting on a further response.
        if canceled && (100..200).contains(&response.status_code) {
            let reason = self.state.lock().await.cancel_intent.reason.clone();
            let _ = self.send_cancel(reason).await;
            let mut session = self.state.lock().await;
            session.transition(SessionStatus::Canceled);
            drop(session);
            self.fire_failed(&session_id, Originator::Local, Cause::Canceled).await;
            return;
        }

        if response.status_code == 100 {
            let mut session = self.state.lock().await;
            session.transition(SessionStatus::OneXxReceived);
            return;
        }

        if (101..200).contains(&response.status_code) {
            // §4.1: an early dialog is only created/confirmed when the
            // response carries a Contact — without one there's no remote
            // target to route further in-dialog requests to.
            if let Some(to_tag) = response.to_tag.clone() {
                if response.contact.is_some() {
                    let dialog_id = DialogId::new(response.call_id.clone(), our_from_tag.clone(), to_tag.clone());
                    let mut session = self.state.lock().await;
                    session.dialogs.create_early(dialog_id);
                    session.to_tag = Some(to_tag);
                }
            }
            {
                let mut session = self.state.lock().await;
                session.transition(SessionStatus::OneXxReceived);
            }
            self.events.publish(SessionEvent::Progress {
                session_id: session_id.clone(),
                originator: Originator::Remote,
                status_code: response.status_code,
            });
            if let Some(body) = response.body {
                let sdp = String::from_utf8_lossy(&body).into_owned();
                if self.negotiation.set_remote_description(sdp, SdpKind::Answer).await.is_err() {
                    self.events.publish(SessionEvent::PeerConnectionError {
                        session_id,
                        op: PeerConnectionOp::SetRemoteDescription.event_name(),
                        message: "setRemoteDescription failed for provisional answer".into(),
                    });
                }
            }
            return;
        }

        if response.status_code / 100 == 2 {
            if canceled {
                let ack = OutgoingRequest::new(Method::Ack);
                let _ = self.transport.send_request(ack).await;
                let bye = OutgoingRequest::new(Method::Bye);
                let _ = self.transport.send_request(bye).await;
                let mut session = self.state.lock().await;
                session.transition(SessionStatus::Terminated);
                let fire = session.fire_terminal_once();
                drop(session);
                if fire {
                    self.events.publish(SessionEvent::Failed { session_id, originator: Originator::Local, cause: Cause::Canceled });
                }
                return;
            }

            // §4.1/§13.2.2.4: a forked 2xx carrying a different to-tag than
            // the branch we've already seen a 1xx from is a losing branch —
            // ACK and BYE it, stay confirmed on the original.
            if let Some(existing_tag) = our_to_tag.as_deref() {
                if response.to_tag.as_deref() != Some(existing_tag) {
                    let ack = OutgoingRequest::new(Method::Ack);
                    let _ = self.transport.send_request(ack).await;
                    let bye = OutgoingRequest::new(Method::Bye);
                    let _ = self.transport.send_request(bye).await;
                    return;
                }
            }

            let Some(body) = response.body else {
                let ack = OutgoingRequest::new(Method::Ack).with_body("application/sdp", Vec::<u8>::new());
                let _ = self.transport.send_request(ack).await;
                let bye = OutgoingRequest::new(Method::Bye);
                let _ = self.transport.send_request(bye).await;
                self.terminate_with_status(&session_id, Cause::MissingSdp, 400).await;
                self.fire_failed(&session_id, Originator::Remote, Cause::BadMediaDescription).await;
                return;
            };

            let to_tag = response.to_tag.clone().unwrap_or_default();
            let dialog_id = DialogId::new(response.call_id.clone(), our_from_tag.clone(), to_tag.clone());
            {
                let mut session = self.state.lock().await;
                session.dialogs.promote(dialog_id);
                session.to_tag = Some(to_tag);
            }

            // §4.1: stable signaling state after an early-dialog answer
            // was already applied means a late 2xx needs a fresh
            // offer/local-description pass before the new answer lands.
            let already_stable = self.negotiation.rtc_ready();
            let sdp = String::from_utf8_lossy(&body).into_owned();
            let apply_result = async {
                if already_stable {
                    let offer = self.negotiation.create_offer().await?;
                    self.negotiation.set_local_description_and_await_ready(&session_id, offer, SdpKind::Offer).await?;
                }
                self.negotiation.set_remote_description(sdp, SdpKind::Answer).await
            }
            .await;

            if apply_result.is_err() {
                let ack = OutgoingRequest::new(Method::Ack);
                let _ = self.transport.send_request(ack).await;
                let bye = OutgoingRequest::new(Method::Bye);
                let _ = self.transport.send_request(bye).await;
                self.fire_failed(&session_id, Originator::Remote, Cause::BadMediaDescription).await;
                return;
            }

            self.negotiate_session_timer_from_response(response.session_expires).await;
            self.events.publish(SessionEvent::Accepted { session_id: session_id.clone(), originator: Originator::Remote });
            let ack = OutgoingRequest::new(Method::Ack);
            let _ = self.transport.send_request(ack).await;
            {
                let mut session = self.state.lock().await;
                session.start_time = Some(chrono::Utc::now());
                session.transition(SessionStatus::Confirmed);
                session.mark_confirmed();
            }
            self.events.publish(SessionEvent::Confirmed { session_id, originator: Originator::Local });
            self.arm_session_timers().await;
            return;
        }

        if response.status_code == 422 {
            let already_retried = {
                let mut session = self.state.lock().await;
                let attempted = session.session_interval_retry_attempted;
                session.session_interval_retry_attempted = true;
                attempted
            };
            if let (false, Some(min_se), Some(sdp)) = (already_retried, response.min_se, self.negotiation.local_sdp()) {
                let raised = min_se.max(self.config.session_expires);
                let request = OutgoingRequest::new(Method::Invite)
                    .with_body("application/sdp", sdp.into_bytes())
                    .with_header(rsip::Header::Other("Session-Expires".into(), format!("{raised};refresher=uac")))
                    .with_header(rsip::Header::Other("Min-SE".into(), min_se.to_string()));
                let _ = self.transport.send_request(request).await;
                return;
            }
            self.terminate_with_status(&session_id, Cause::Rejected, 422).await;
            return;
        }

        // Any other final response: map to a cause and fail.
        let cause = cause_from_status(response.status_code);
        {
            let mut session = self.state.lock().await;
            session.transition(SessionStatus::Terminated);
        }
        self.fire_failed(&session_id, Originator::Remote, cause).await;
    }

    /// Response to a UAC-initiated re-INVITE/UPDATE sent from
    /// `renegotiate` (§4.3). Clears `uac_pending_reply` regardless of
    /// outcome — without this, eligibility (§4.3) would never recover
    /// after the first renegotiation.
    async fn on_reinvite_or_update_response(self: &Arc<Self>, response: IncomingResponse) {
        let was_pending = {
            let mut session = self.state.lock().await;
            match session.dialogs.confirmed_mut() {
                Some(dialog) if dialog.uac_pending_reply => {
                    dialog.uac_pending_reply = false;
                    true
                }
                _ => false,
            }
        };
        if !was_pending {
            return;
        }

        if response.status_code / 100 == 2 {
            self.negotiate_session_timer_from_response(response.session_expires).await;
            if let Some(body) = response.body {
                let sdp = String::from_utf8_lossy(&body).into_owned();
                if self.negotiation.set_remote_description(sdp, SdpKind::Answer).await.is_err() {
                    tracing::warn!("setRemoteDescription failed applying re-negotiation answer");
                }
            }
        } else {
            // 491 Request Pending and any other rejection: leave it to the
            // caller to retry via `renegotiate()` rather than guessing a
            // backoff (§9 open question, resolved in DESIGN.md).
            tracing::warn!(status = response.status_code, "re-negotiation rejected");
        }
    }

    // -- helpers --------------------------------------------------------

    async fn send_cancel(&self, reason_text: Option<String>) -> Result<()> {
        let mut request = OutgoingRequest::new(Method::Cancel);
        if let Some(text) = reason_text {
            request = request.with_header(rsip::Header::Other("Reason".into(), format!("SIP ;cause=200 ;text=\"{text}\"")));
        }
        self.transport.send_request(request).await.map_err(|e| SessionError::Transport { message: e.message })
    }

    fn media_failure(&self, op: PeerConnectionOp, err: MediaEngineError) -> SessionError {
        tracing::warn!(op = ?op, error = %err, "peer connection operation failed");
        SessionError::Media { message: err.message }
    }

    async fn terminate_with_cause(self: &Arc<Self>, session_id: &str, cause: Cause) {
        let (status_code, _reason) = status_for_cause(cause);
        self.terminate_with_status(session_id, cause, status_code).await;
    }

    async fn terminate_with_status(self: &Arc<Self>, session_id: &str, cause: Cause, _status_code: u16) {
        self.disarm_all().await;
        let mut session = self.state.lock().await;
        session.transition(SessionStatus::Terminated);
        session.end_time = Some(chrono::Utc::now());
        let fire = session.fire_terminal_once();
        session.dialogs.close_all();
        drop(session);
        if fire {
            self.events.publish(SessionEvent::Failed {
                session_id: session_id.to_string(),
                originator: Originator::Local,
                cause,
            });
        }
    }

    async fn fire_failed(&self, session_id: &str, originator: Originator, cause: Cause) {
        self.disarm_all().await;
        let mut session = self.state.lock().await;
        session.end_time = Some(chrono::Utc::now());
        let fire = session.fire_terminal_once();
        session.dialogs.close_all();
        drop(session);
        if fire {
            self.events.publish(SessionEvent::Failed { session_id: session_id.to_string(), originator, cause });
        }
    }

    async fn disarm_all(&self) {
        self.timers.lock().await.disarm_all();
    }

    async fn disarm_ack_timers(&self) {
        let mut timers = self.timers.lock().await;
        timers.cancel_retransmit();
        timers.cancel_ack_wait();
    }

    /// Arms the 2xx-retransmit and ACK-wait (Timer H) timers while
    /// `WAITING_FOR_ACK` (§4.4). `body` is re-sent with every retransmit.
    async fn arm_ack_timers(self: &Arc<Self>, _is_reinvite: bool) {
        let (t1, t2, timer_h) = (self.config.t1, self.config.t2, self.config.timer_h);
        let mut timers = self.timers.lock().await;
        let this = self.clone();
        timers.arm_retransmit(
            t1,
            t2,
            Arc::new(move || {
                let this = this.clone();
                Box::pin(async move {
                    let still_waiting = this.state.lock().await.status == SessionStatus::WaitingForAck;
                    if still_waiting {
                        let response = OutgoingResponse::new(200);
                        let _ = this.transport.send_response(response).await;
                    }
                })
            }),
        );
        let this = self.clone();
        timers.arm_ack_wait(
            timer_h,
            Arc::new(move || {
                let this = this.clone();
                Box::pin(async move {
                    let still_waiting = this.state.lock().await.status == SessionStatus::WaitingForAck;
                    if !still_waiting {
                        return;
                    }
                    this.timers.lock().await.cancel_retransmit();
                    let bye = OutgoingRequest::new(Method::Bye);
                    let _ = this.transport.send_request(bye).await;
                    let session_id = this.state.lock().await.id.clone();
                    this.fire_failed(&session_id, Originator::Remote, Cause::NoAck).await;
                })
            }),
        );
    }

    /// Arms the "user no-answer" timeout while `WAITING_FOR_ANSWER` (§2
    /// Timer Manager breakdown): if nothing has answered or rejected the
    /// call locally by the time it fires, give up and reject it.
    async fn arm_no_answer_timer(self: &Arc<Self>) {
        let timeout = Duration::from_secs(self.config.no_answer_timeout as u64);
        let this = self.clone();
        let mut timers = self.timers.lock().await;
        timers.arm_no_answer(
            timeout,
            Arc::new(move || {
                let this = this.clone();
                Box::pin(async move {
                    let still_waiting = this.state.lock().await.status == SessionStatus::WaitingForAnswer;
                    if !still_waiting {
                        return;
                    }
                    let session_id = this.state.lock().await.id.clone();
                    let _ = this.transport.send_response(OutgoingResponse::new(480).with_reason("Temporarily Unavailable")).await;
                    {
                        let mut session = this.state.lock().await;
                        session.transition(SessionStatus::Terminated);
                    }
                    this.fire_failed(&session_id, Originator::Local, Cause::RequestTimeout).await;
                })
            }),
        );
    }

    /// Builds the `Session-Expires` header reflecting the currently
    /// negotiated interval and refresher role (§4.4), or `None` when
    /// session timers aren't enabled.
    async fn session_expires_header(&self) -> Option<rsip::Header> {
        let session = self.state.lock().await;
        if !session.session_timers.enabled {
            return None;
        }
        let refresher = match (session.direction, session.session_timers.is_refresher) {
            (Direction::Outgoing, true) | (Direction::Incoming, false) => "uac",
            (Direction::Incoming, true) | (Direction::Outgoing, false) => "uas",
        };
        Some(rsip::Header::Other(
            "Session-Expires".into(),
            format!("{};refresher={refresher}", session.session_timers.current_expires),
        ))
    }

    fn min_se_header(&self) -> rsip::Header {
        rsip::Header::Other("Min-SE".into(), self.config.min_session_expires.to_string())
    }

    /// Computes session-expires on an incoming INVITE/UPDATE carrying
    /// `Session-Expires` (§4.4), adding the resulting header to our 200.
    /// Default refresher is `uas` — i.e. us, the party handling the
    /// request — unless the peer explicitly claimed the role.
    pub async fn negotiate_session_timer_from_request(&self, negotiated: Option<(u32, RefreshMethod, bool)>) {
        let mut session = self.state.lock().await;
        if !session.session_timers.enabled {
            return;
        }
        match negotiated {
            Some((expires, method, refresher_is_peer)) if expires >= self.config.min_session_expires => {
                session.session_timers.current_expires = expires;
                session.session_timers.refresh_method = method;
                session.session_timers.is_refresher = !refresher_is_peer;
            }
            _ => {
                session.session_timers.current_expires = self.config.session_expires;
                session.session_timers.is_refresher = true;
            }
        }
        session.session_timers.running = true;
    }

    /// Default refresher for an incoming response is `uac` — i.e. us, the
    /// party that sent the original INVITE — unless the peer explicitly
    /// claimed the role (§4.4).
    async fn negotiate_session_timer_from_response(&self, session_expires: Option<(u32, RefreshMethod, bool)>) {
        let mut session = self.state.lock().await;
        if !session.session_timers.enabled {
            return;
        }
        match session_expires {
            Some((expires, method, refresher_is_peer)) => {
                session.session_timers.current_expires = expires;
                session.session_timers.refresh_method = method;
                session.session_timers.is_refresher = !refresher_is_peer;
            }
            None => session.session_timers.is_refresher = true,
        }
        session.session_timers.running = true;
    }

    /// Arms the RFC 4028 refresher/watchdog timer appropriate to our role
    /// (§4.4).
    async fn arm_session_timers(self: &Arc<Self>) {
        let (enabled, is_refresher, expires, refresh_method) = {
            let session = self.state.lock().await;
            (
                session.session_timers.enabled,
                session.session_timers.is_refresher,
                session.session_timers.current_expires_duration(),
                session.session_timers.refresh_method,
            )
        };
        if !enabled {
            return;
        }
        let mut timers = self.timers.lock().await;
        if is_refresher {
            let this = self.clone();
            timers.arm_session_refresh(
                expires,
                Arc::new(move || {
                    let this = this.clone();
                    Box::pin(async move {
                        let confirmed = this.state.lock().await.status == SessionStatus::Confirmed;
                        if !confirmed {
                            return;
                        }
                        let options = RenegotiateOptions { use_update: matches!(refresh_method, RefreshMethod::Update) };
                        let _ = this.renegotiate(options).await;
                    })
                }),
            );
        } else {
            let this = self.clone();
            let session_id = self.state.lock().await.id.clone();
            timers.arm_session_watchdog(
                expires,
                Arc::new(move || {
                    let this = this.clone();
                    let session_id = session_id.clone();
                    Box::pin(async move {
                        let still_live = this.state.lock().await.status == SessionStatus::Confirmed;
                        if !still_live {
                            return;
                        }
                        this.terminate_with_status(&session_id, Cause::RequestTimeout, 408).await;
                    })
                }),
            );
        }
    }
}

fn parse_dtmf_signal(body: &[u8]) -> Option<char> {
    let text = std::str::from_utf8(body).ok()?;
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("Signal=") {
            return value.trim().chars().next();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{IceGatheringState, MediaEngineError as MediaErr, SessionDescription, SignalingState};
    use crate::observer::NullObserver;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct FakePc {
        gathering: StdMutex<IceGatheringState>,
        local_sdp: StdMutex<Option<String>>,
    }

    impl FakePc {
        fn new() -> Self {
            Self { gathering: StdMutex::new(IceGatheringState::Complete), local_sdp: StdMutex::new(None) }
        }
    }

    #[async_trait]
    impl PeerConnection for FakePc {
        async fn create_offer(&self) -> std::result::Result<String, MediaErr> {
            Ok("v=0\r\no=- offer\r\n".into())
        }
        async fn create_answer(&self) -> std::result::Result<String, MediaErr> {
            Ok("v=0\r\no=- answer\r\n".into())
        }
        async fn set_local_description(&self, desc: SessionDescription) -> std::result::Result<(), MediaErr> {
            *self.local_sdp.lock().unwrap() = Some(desc.sdp);
            Ok(())
        }
        async fn set_remote_description(&self, _desc: SessionDescription) -> std::result::Result<(), MediaErr> {
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

    struct RecordingTransport {
        requests: StdMutex<Vec<Method>>,
        responses: StdMutex<Vec<u16>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self { requests: StdMutex::new(Vec::new()), responses: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl SipTransport for RecordingTransport {
        async fn send_request(&self, request: OutgoingRequest) -> std::result::Result<(), crate::transport::TransportError> {
            self.requests.lock().unwrap().push(request.method);
            Ok(())
        }
        async fn send_response(&self, response: OutgoingResponse) -> std::result::Result<(), crate::transport::TransportError> {
            self.responses.lock().unwrap().push(response.status_code);
            Ok(())
        }
    }

    fn test_session() -> (Arc<SipSession>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let session = SipSession::new_outgoing(
            SipAddress::new(None, "sip:alice@example.com"),
            SipAddress::new(None, "sip:bob@example.com"),
            "sip:alice@10.0.0.1".into(),
            transport.clone(),
            Arc::new(FakePc::new()),
            Arc::new(NullObserver),
            SessionConfig::default(),
        );
        (session, transport)
    }

    #[tokio::test]
    async fn connect_transitions_to_invite_sent_and_sends_invite() {
        let (session, transport) = test_session();
        session.connect(ConnectOptions::default()).await.unwrap();
        assert_eq!(session.status().await, SessionStatus::InviteSent);
        assert_eq!(transport.requests.lock().unwrap().as_slice(), &[Method::Invite]);
    }

    #[tokio::test]
    async fn connect_rejects_when_not_null() {
        let (session, _transport) = test_session();
        session.connect(ConnectOptions::default()).await.unwrap();
        let err = session.connect(ConnectOptions::default()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn terminate_before_response_latches_cancel_intent() {
        let (session, _transport) = test_session();
        session.connect(ConnectOptions::default()).await.unwrap();
        session.terminate(TerminateOptions::default()).await.unwrap();
        assert_eq!(session.status().await, SessionStatus::InviteSent);
    }

    #[tokio::test]
    async fn happy_path_outgoing_call_reaches_confirmed() {
        let (session, transport) = test_session();
        session.connect(ConnectOptions::default()).await.unwrap();

        session
            .receive_response(IncomingResponse {
                status_code: 180,
                reason_phrase: None,
                call_id: session.id().await,
                from_tag: "localtag".into(),
                to_tag: Some("remotetag".into()),
                contact: None,
                content_type: None,
                body: None,
                session_expires: None,
                min_se: None,
            })
            .await;
        assert_eq!(session.status().await, SessionStatus::OneXxReceived);

        session
            .receive_response(IncomingResponse {
                status_code: 200,
                reason_phrase: None,
                call_id: session.id().await,
                from_tag: "localtag".into(),
                to_tag: Some("remotetag".into()),
                contact: None,
                content_type: Some("application/sdp".into()),
                body: Some(b"v=0\r\no=- answer\r\n".to_vec()),
                session_expires: None,
                min_se: None,
            })
            .await;

        assert_eq!(session.status().await, SessionStatus::Confirmed);
        assert!(transport.requests.lock().unwrap().contains(&Method::Ack));
    }

    #[tokio::test]
    async fn missing_sdp_on_2xx_terminates_with_missing_sdp() {
        let (session, transport) = test_session();
        session.connect(ConnectOptions::default()).await.unwrap();
        session
            .receive_response(IncomingResponse {
                status_code: 200,
                reason_phrase: None,
                call_id: session.id().await,
                from_tag: "localtag".into(),
                to_tag: Some("remotetag".into()),
                contact: None,
                content_type: None,
                body: None,
                session_expires: None,
                min_se: None,
            })
            .await;
        assert_eq!(session.status().await, SessionStatus::Terminated);
        assert!(transport.requests.lock().unwrap().contains(&Method::Bye));
    }

    #[tokio::test]
    async fn send_dtmf_rejects_invalid_tones() {
        let (session, _transport) = test_session();
        {
            let mut s = session.state.lock().await;
            s.status = SessionStatus::Confirmed;
        }
        let err = session
            .send_dtmf("12x", DtmfOptions { duration: Duration::from_millis(100), inter_tone_gap: Duration::from_millis(70) })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn send_dtmf_queues_and_sends_info_per_tone() {
        let (session, transport) = test_session();
        {
            let mut s = session.state.lock().await;
            s.status = SessionStatus::Confirmed;
        }
        session
            .send_dtmf("12", DtmfOptions { duration: Duration::from_millis(10), inter_tone_gap: Duration::from_millis(70) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        let sent = transport.requests.lock().unwrap().iter().filter(|m| **m == Method::Info).count();
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn renegotiate_rejects_when_not_eligible() {
        let (session, _transport) = test_session();
        // No confirmed dialog yet -> not eligible.
        let ok = session.renegotiate(RenegotiateOptions::default()).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn renegotiate_false_while_uac_pending_reply() {
        let (session, _transport) = test_session();
        {
            let mut s = session.state.lock().await;
            let dialog_id = DialogId::new("call1", "local", "remote");
            s.dialogs.create_early(dialog_id.clone());
            s.dialogs.promote(dialog_id);
            if let Some(d) = s.dialogs.confirmed_mut() {
                d.uac_pending_reply = true;
            }
        }
        let ok = session.renegotiate(RenegotiateOptions::default()).await;
        assert!(!ok);
    }

    #[test]
    fn dialog_state_import_is_used() {
        let _ = DialogState::Early;
        let _ = Dialog::new(DialogId::new("a", "b", "c"), DialogState::Early);
    }
}
