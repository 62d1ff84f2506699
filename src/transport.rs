//! The SIP transport/transaction contract consumed by the session core.
//!
//! Transport, transaction matching, retransmission below the 2xx level,
//! and authentication retries are all out of scope (§1): the session core
//! only needs to hand a method + headers + body to something that knows
//! how to address it within the right dialog and transaction.

use async_trait::async_trait;
use rsip::{Header, Method};

/// A request the session wants sent, either a new early-dialog-forming
/// INVITE/new transaction (CANCEL, in-dialog BYE/INFO/UPDATE/re-INVITE) or
/// a mid-dialog request built by `sendRequest`.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub extra_headers: Vec<Header>,
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl OutgoingRequest {
    pub fn new(method: Method) -> Self {
        Self { method, extra_headers: Vec::new(), content_type: None, body: None }
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.extra_headers.push(header);
        self
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = Some(body.into());
        self
    }
}

/// A response to an inbound request.
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub status_code: u16,
    pub reason_phrase: Option<String>,
    pub extra_headers: Vec<Header>,
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl OutgoingResponse {
    pub fn new(status_code: u16) -> Self {
        Self { status_code, reason_phrase: None, extra_headers: Vec::new(), content_type: None, body: None }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason_phrase = Some(reason.into());
        self
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.extra_headers.push(header);
        self
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = Some(body.into());
        self
    }
}

/// Failure sending a message through the transport layer.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Abstract SIP transport/transaction layer. Implementations own message
/// framing, `Via`/`CSeq`/routing header construction, retransmission below
/// the 2xx level, and authentication challenge retries.
#[async_trait]
pub trait SipTransport: Send + Sync {
    /// Send a request within (or establishing) this session's dialog.
    async fn send_request(&self, request: OutgoingRequest) -> Result<(), TransportError>;

    /// Reply to the inbound request currently being processed.
    async fn send_response(&self, response: OutgoingResponse) -> Result<(), TransportError>;
}
