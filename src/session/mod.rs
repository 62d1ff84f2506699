//! Session data model (§3).

pub mod dtmf;
pub mod state_machine;

pub use state_machine::{
    AnswerOptions, ConnectOptions, DtmfOptions, IncomingRequest, IncomingResponse, RenegotiateOptions, SipSession,
    TerminateOptions,
};

use crate::config::RefreshMethod;
use crate::dialog::DialogRegistry;
use crate::identity::SipAddress;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::time::Duration;

/// One of the states a session moves through (§3). Initial `Null`,
/// terminal `{Canceled, Terminated}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum SessionStatus {
    Null,
    InviteSent,
    OneXxReceived,
    InviteReceived,
    WaitingForAnswer,
    Answered,
    WaitingForAck,
    Canceled,
    Terminated,
    Confirmed,
}

impl SessionStatus {
    /// Status monotonicity (§3): once terminal, no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Canceled | SessionStatus::Terminated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// RFC 4028 session-timer bookkeeping (§3).
#[derive(Debug, Clone)]
pub struct SessionTimerState {
    pub enabled: bool,
    pub refresh_method: RefreshMethod,
    pub default_expires: u32,
    pub current_expires: u32,
    pub running: bool,
    /// True when this endpoint is the refresher.
    pub is_refresher: bool,
}

impl SessionTimerState {
    pub fn new(enabled: bool, refresh_method: RefreshMethod, default_expires: u32) -> Self {
        Self {
            enabled,
            refresh_method,
            default_expires,
            current_expires: default_expires,
            running: false,
            is_refresher: false,
        }
    }

    pub fn current_expires_duration(&self) -> Duration {
        Duration::from_secs(self.current_expires as u64)
    }
}

/// A latched intent to cancel, recorded before a final response is seen
/// (§3 `is_canceled`/`cancel_reason`).
#[derive(Debug, Clone, Default)]
pub struct CancelIntent {
    pub canceled: bool,
    pub reason: Option<String>,
}

/// Core session data: one per call attempt (§3).
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub direction: Direction,
    pub local_identity: SipAddress,
    pub remote_identity: SipAddress,
    pub from_tag: String,
    pub to_tag: Option<String>,
    pub contact: String,
    pub call_id: String,

    pub dialogs: DialogRegistry,

    pub is_confirmed: bool,
    pub cancel_intent: CancelIntent,
    pub late_sdp: bool,
    /// RFC 4028 §3: the 422 Session Interval Too Small retry is attempted
    /// at most once per INVITE attempt.
    pub session_interval_retry_attempted: bool,
    /// §3 invariant: `_ended`/`_failed` each fire at most once and are
    /// mutually exclusive; this latches the first of either.
    pub terminal_fired: bool,

    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,

    pub session_timers: SessionTimerState,

    pub data: Option<Box<dyn Any + Send + Sync>>,
}

impl Session {
    pub fn new(
        direction: Direction,
        call_id: String,
        from_tag: String,
        local_identity: SipAddress,
        remote_identity: SipAddress,
        contact: String,
        session_timers: SessionTimerState,
    ) -> Self {
        let id = crate::identity::session_id(&call_id, &from_tag);
        Self {
            id,
            status: SessionStatus::Null,
            direction,
            local_identity,
            remote_identity,
            from_tag,
            to_tag: None,
            contact,
            call_id,
            dialogs: DialogRegistry::new(),
            is_confirmed: false,
            cancel_intent: CancelIntent::default(),
            late_sdp: false,
            session_interval_retry_attempted: false,
            terminal_fired: false,
            start_time: None,
            end_time: None,
            session_timers,
            data: None,
        }
    }

    /// §3 invariant: `is_confirmed` becomes true at most once.
    pub fn mark_confirmed(&mut self) -> bool {
        if self.is_confirmed {
            false
        } else {
            self.is_confirmed = true;
            true
        }
    }

    /// Claims the single `_ended`/`_failed` slot (§3, testable property 1).
    /// Returns `true` the first time it's called for this session.
    pub fn fire_terminal_once(&mut self) -> bool {
        if self.terminal_fired {
            false
        } else {
            self.terminal_fired = true;
            true
        }
    }

    pub fn transition(&mut self, next: SessionStatus) {
        debug_assert!(!self.status.is_terminal(), "no transitions out of a terminal status");
        tracing::debug!(session_id = %self.id, from = %self.status, to = %next, "status");
        self.status = next;
    }
}
