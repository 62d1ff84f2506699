//! Scenario tests (§8): literal walkthroughs of the call-flow narratives,
//! as opposed to the per-module unit tests living alongside the code.

mod common;

use common::{FakePeerConnection, RecordingTransport};
use sip_session_core::config::SessionConfig;
use sip_session_core::dialog::DialogId;
use sip_session_core::events::{Originator, SessionEvent};
use sip_session_core::identity::SipAddress;
use sip_session_core::observer::NullObserver;
use sip_session_core::session::{ConnectOptions, IncomingResponse, RenegotiateOptions, SessionStatus, SipSession, TerminateOptions};
use std::sync::Arc;

fn new_outgoing_session() -> (Arc<SipSession>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let session = SipSession::new_outgoing(
        SipAddress::new(None, "sip:alice@example.com"),
        SipAddress::new(None, "sip:bob@example.com"),
        "sip:alice@10.0.0.1:5060".into(),
        transport.clone(),
        Arc::new(FakePeerConnection::new()),
        Arc::new(NullObserver),
        SessionConfig::default(),
    );
    (session, transport)
}

fn response(session_id_call: &str, status: u16, to_tag: Option<&str>, body: Option<&str>) -> IncomingResponse {
    IncomingResponse {
        status_code: status,
        reason_phrase: None,
        call_id: session_id_call.into(),
        from_tag: "alice-tag".into(),
        to_tag: to_tag.map(|s| s.into()),
        contact: Some("sip:bob@10.0.0.2:5060".into()),
        content_type: body.map(|_| "application/sdp".into()),
        body: body.map(|s| s.as_bytes().to_vec()),
        session_expires: None,
        min_se: None,
    }
}

/// S1: connect, 100, 180 (no body), 200 with answer — ends CONFIRMED with
/// an ACK sent.
#[tokio::test]
async fn s1_outgoing_happy_path() {
    let (session, transport) = new_outgoing_session();
    let mut events = session.subscribe();

    session.connect(ConnectOptions::default()).await.unwrap();
    assert_eq!(session.status().await, SessionStatus::InviteSent);

    session.receive_response(response("call-1", 100, None, None)).await;
    assert_eq!(session.status().await, SessionStatus::OneXxReceived);

    session.receive_response(response("call-1", 180, Some("bob-tag"), None)).await;
    assert_eq!(session.status().await, SessionStatus::OneXxReceived);

    session.receive_response(response("call-1", 200, Some("bob-tag"), Some("v=0\r\no=- answer\r\n"))).await;
    assert_eq!(session.status().await, SessionStatus::Confirmed);
    assert!(session.start_time().await.is_some());

    assert!(transport.sent_methods().contains(&rsip::Method::Ack));

    let mut saw_accepted = false;
    let mut saw_confirmed = false;
    while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(50), events.recv()).await {
        match event {
            SessionEvent::Accepted { .. } => saw_accepted = true,
            SessionEvent::Confirmed { .. } => saw_confirmed = true,
            _ => {}
        }
    }
    assert!(saw_accepted && saw_confirmed);
}

/// S2: connect, immediate terminate() before any response, then a 100
/// arrives — CANCEL is only sent once the 1xx shows up, and the session
/// ends CANCELED with a local failed(CANCELED).
#[tokio::test]
async fn s2_cancel_before_1xx() {
    let (session, transport) = new_outgoing_session();
    let mut events = session.subscribe();
    session.connect(ConnectOptions::default()).await.unwrap();
    session.terminate(TerminateOptions::default()).await.unwrap();

    // No CANCEL yet: still INVITE_SENT, nothing but INVITE sent.
    assert_eq!(transport.sent_methods(), vec![rsip::Method::Invite]);

    session.receive_response(response("call-2", 100, None, None)).await;

    assert_eq!(session.status().await, SessionStatus::Canceled);
    assert!(transport.sent_methods().contains(&rsip::Method::Cancel));

    let mut saw_failed = false;
    while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(50), events.recv()).await {
        if let SessionEvent::Failed { originator: Originator::Local, cause, .. } = event {
            assert_eq!(cause, sip_session_core::causes::Cause::Canceled);
            saw_failed = true;
        }
    }
    assert!(saw_failed);
}

/// S3: a 180 creates an early dialog tagged A; a 2xx arrives tagged B
/// (a different branch) — it gets ACKed then BYEd without disturbing the
/// session, which still waits on the A branch.
#[tokio::test]
async fn s3_fork_acks_and_byes_the_losing_branch() {
    let (session, transport) = new_outgoing_session();
    session.connect(ConnectOptions::default()).await.unwrap();

    session.receive_response(response("call-3", 180, Some("tag-a"), None)).await;
    assert_eq!(session.status().await, SessionStatus::OneXxReceived);

    session.receive_response(response("call-3", 200, Some("tag-b"), Some("v=0\r\no=- answer\r\n"))).await;

    // The losing, forked branch is ACKed then BYEd; the session stays on
    // the A branch, still waiting for its own 2xx.
    assert_eq!(session.status().await, SessionStatus::OneXxReceived);
    assert!(transport.sent_methods().contains(&rsip::Method::Ack));
    assert!(transport.sent_methods().contains(&rsip::Method::Bye));
}

/// S5: renegotiate() must return false while a UAC-initiated
/// renegotiation is already pending a reply on the confirmed dialog.
#[tokio::test]
async fn s5_renegotiate_false_while_uac_pending_reply() {
    let (session, _transport) = new_outgoing_session();
    session.connect(ConnectOptions::default()).await.unwrap();
    session.receive_response(response("call-5", 200, Some("bob-tag"), Some("v=0\r\no=- answer\r\n"))).await;
    assert_eq!(session.status().await, SessionStatus::Confirmed);

    let first = session.renegotiate(RenegotiateOptions::default()).await;
    assert!(first, "first renegotiation should be eligible");

    let second = session.renegotiate(RenegotiateOptions::default()).await;
    assert!(!second, "a second renegotiation must not start while the first is pending a reply");
}

/// The response to a UAC-initiated re-INVITE clears `uac_pending_reply`,
/// making a further renegotiation eligible again.
#[tokio::test]
async fn renegotiate_becomes_eligible_again_after_response() {
    let (session, _transport) = new_outgoing_session();
    session.connect(ConnectOptions::default()).await.unwrap();
    session.receive_response(response("call-5b", 200, Some("bob-tag"), Some("v=0\r\no=- answer\r\n"))).await;

    assert!(session.renegotiate(RenegotiateOptions::default()).await);
    assert!(!session.renegotiate(RenegotiateOptions::default()).await);

    session.receive_response(response("call-5b", 200, Some("bob-tag"), Some("v=0\r\no=- answer\r\n"))).await;

    assert!(session.renegotiate(RenegotiateOptions::default()).await, "eligible again once the re-INVITE's 200 arrived");
}

/// Terminating from CONFIRMED sends BYE and fires exactly one `ended`.
#[tokio::test]
async fn terminate_confirmed_sends_bye_once() {
    let (session, transport) = new_outgoing_session();
    session.connect(ConnectOptions::default()).await.unwrap();
    session.receive_response(response("call-6", 200, Some("bob-tag"), Some("v=0\r\no=- answer\r\n"))).await;

    let mut events = session.subscribe();
    session.terminate(TerminateOptions::default()).await.unwrap();
    assert_eq!(session.status().await, SessionStatus::Terminated);
    assert!(transport.sent_methods().contains(&rsip::Method::Bye));

    let mut ended_count = 0;
    while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(50), events.recv()).await {
        if matches!(event, SessionEvent::Ended { originator: Originator::Local, .. }) {
            ended_count += 1;
        }
    }
    assert_eq!(ended_count, 1);

    // Terminating a second time is now rejected: already terminal.
    assert!(session.terminate(TerminateOptions::default()).await.is_err());
}

/// S4: inbound INVITE with no body (late SDP), answer() supplies the
/// offer in the 200, the ACK carries the remote answer.
#[tokio::test]
async fn s4_late_sdp_confirms_on_ack_with_answer() {
    let transport = Arc::new(RecordingTransport::new());
    let session = SipSession::new_incoming(
        "call-4".into(),
        "alice-tag".into(),
        SipAddress::new(None, "sip:alice@example.com"),
        SipAddress::new(None, "sip:bob@example.com"),
        "sip:bob@10.0.0.2:5060".into(),
        None, // no offer in the INVITE
        None,
        transport.clone(),
        Arc::new(FakePeerConnection::new()),
        Arc::new(NullObserver),
        SessionConfig::default(),
    )
    .await;
    assert_eq!(session.status().await, SessionStatus::WaitingForAnswer);

    session.answer(sip_session_core::session::AnswerOptions::default()).await.unwrap();
    assert_eq!(session.status().await, SessionStatus::WaitingForAck);
    assert!(transport.sent_statuses().contains(&200));

    session
        .receive_request(sip_session_core::session::IncomingRequest {
            method: rsip::Method::Ack,
            call_id: "call-4".into(),
            remote_tag: "alice-tag".into(),
            local_tag: Some("bob-tag".into()),
            cseq: 1,
            contact: None,
            content_type: Some("application/sdp".into()),
            body: Some(b"v=0\r\no=- answer\r\n".to_vec()),
            session_expires: None,
        })
        .await;

    assert_eq!(session.status().await, SessionStatus::Confirmed);
}

/// S4 (failure branch): an ACK with no body while late-SDP is expected
/// terminates with MISSING_SDP.
#[tokio::test]
async fn s4_late_sdp_ack_without_body_terminates() {
    let transport = Arc::new(RecordingTransport::new());
    let session = SipSession::new_incoming(
        "call-4b".into(),
        "alice-tag".into(),
        SipAddress::new(None, "sip:alice@example.com"),
        SipAddress::new(None, "sip:bob@example.com"),
        "sip:bob@10.0.0.2:5060".into(),
        None,
        None,
        transport.clone(),
        Arc::new(FakePeerConnection::new()),
        Arc::new(NullObserver),
        SessionConfig::default(),
    )
    .await;
    session.answer(sip_session_core::session::AnswerOptions::default()).await.unwrap();

    session
        .receive_request(sip_session_core::session::IncomingRequest {
            method: rsip::Method::Ack,
            call_id: "call-4b".into(),
            remote_tag: "alice-tag".into(),
            local_tag: Some("bob-tag".into()),
            cseq: 1,
            contact: None,
            content_type: None,
            body: None,
            session_expires: None,
        })
        .await;

    assert_eq!(session.status().await, SessionStatus::Terminated);
}

/// S6: negotiated current_expires=90s with the peer (uac) as refresher —
/// we're the uas and therefore the watchdog side. It fires at 1.1x and
/// terminates with REQUEST_TIMEOUT.
#[tokio::test(start_paused = true)]
async fn s6_session_timer_expiry_as_non_refresher() {
    let transport = Arc::new(RecordingTransport::new());
    let session = SipSession::new_incoming(
        "call-6".into(),
        "alice-tag".into(),
        SipAddress::new(None, "sip:alice@example.com"),
        SipAddress::new(None, "sip:bob@example.com"),
        "sip:bob@10.0.0.2:5060".into(),
        Some("v=0\r\no=- offer\r\n".into()),
        Some((90, sip_session_core::config::RefreshMethod::Invite, true)),
        transport.clone(),
        Arc::new(FakePeerConnection::new()),
        Arc::new(NullObserver),
        SessionConfig::default(),
    )
    .await;

    session.answer(sip_session_core::session::AnswerOptions::default()).await.unwrap();

    session
        .receive_request(sip_session_core::session::IncomingRequest {
            method: rsip::Method::Ack,
            call_id: "call-6".into(),
            remote_tag: "alice-tag".into(),
            local_tag: Some("bob-tag".into()),
            cseq: 1,
            contact: None,
            content_type: None,
            body: None,
            session_expires: None,
        })
        .await;
    assert_eq!(session.status().await, SessionStatus::Confirmed);

    tokio::time::advance(std::time::Duration::from_secs(99)).await;
    tokio::task::yield_now().await;

    assert_eq!(session.status().await, SessionStatus::Terminated);
}

#[test]
fn dialog_id_helper_is_exercised_by_the_suite() {
    let id = DialogId::new("call-x", "local", "remote");
    assert_eq!(id.to_string(), "call-x:local:remote");
}
