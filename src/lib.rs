//! INVITE dialog state machine and SDP offer/answer coordination for a
//! SIP user agent (RFC 3261 §13, RFC 3264, RFC 4028).
//!
//! This crate is the session core only: the SIP transport/transaction
//! layer, message parser/serializer, and media (RTP/codec) engine are
//! external collaborators consumed through the [`transport::SipTransport`]
//! and [`media::PeerConnection`] traits.

pub mod causes;
pub mod config;
pub mod dialog;
pub mod errors;
pub mod events;
pub mod identity;
pub mod media;
pub mod negotiation;
pub mod observer;
pub mod session;
pub mod timers;
pub mod transport;

pub use causes::Cause;
pub use config::SessionConfig;
pub use errors::{Result, SessionError};
pub use events::{SessionEvent, SessionEventBus, SessionEventSubscriber};
pub use session::{Direction, SessionStatus, SipSession};
