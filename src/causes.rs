//! Failure/end cause vocabulary (§4.5) and SIP status -> cause mapping.

use serde::{Deserialize, Serialize};

/// Canonical cause vocabulary carried on `_ended`/`_failed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cause {
    Bye,
    Canceled,
    NoAck,
    Busy,
    Rejected,
    Redirected,
    Unavailable,
    NotFound,
    AddressIncomplete,
    IncompatibleSdp,
    MissingSdp,
    BadMediaDescription,
    AuthenticationError,
    RequestTimeout,
    DialogError,
    ConnectionError,
    WebrtcError,
    InternalError,
    UserDeniedMediaAccess,
}

/// Map a final SIP response status code to a cause, per the standard SIP
/// status-class mapping in §4.5.
pub fn cause_from_status(status_code: u16) -> Cause {
    match status_code {
        404 => Cause::NotFound,
        486 | 600 => Cause::Busy,
        301 | 302 => Cause::Redirected,
        408 => Cause::RequestTimeout,
        480 | 410 => Cause::Unavailable,
        484 => Cause::AddressIncomplete,
        401 | 407 => Cause::AuthenticationError,
        488 | 606 => Cause::IncompatibleSdp,
        401..=699 => Cause::Rejected,
        _ => Cause::Rejected,
    }
}

/// The SIP status code + reason phrase a given cause should be reported
/// with when *we* are the one emitting a final response/BYE/CANCEL for it.
pub fn status_for_cause(cause: Cause) -> (u16, &'static str) {
    match cause {
        Cause::Bye => (200, "OK"),
        Cause::Canceled => (487, "Request Terminated"),
        Cause::NoAck => (408, "Request Timeout"),
        Cause::Busy => (486, "Busy Here"),
        Cause::Rejected => (603, "Decline"),
        Cause::Redirected => (302, "Moved Temporarily"),
        Cause::Unavailable => (480, "Temporarily Unavailable"),
        Cause::NotFound => (404, "Not Found"),
        Cause::AddressIncomplete => (484, "Address Incomplete"),
        Cause::IncompatibleSdp => (488, "Not Acceptable Here"),
        Cause::MissingSdp => (400, "Missing SDP"),
        Cause::BadMediaDescription => (488, "Not Acceptable Here"),
        Cause::AuthenticationError => (401, "Unauthorized"),
        Cause::RequestTimeout => (408, "Request Timeout"),
        Cause::DialogError => (500, "Server Internal Error"),
        Cause::ConnectionError => (500, "Server Internal Error"),
        Cause::WebrtcError => (500, "Server Internal Error"),
        Cause::InternalError => (500, "Server Internal Error"),
        Cause::UserDeniedMediaAccess => (480, "Temporarily Unavailable"),
    }
}
