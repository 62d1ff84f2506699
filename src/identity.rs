//! SIP address identities and opaque tag generation (RFC 3261 §19.3).

use rand::Rng;
use rsip::Uri;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A SIP address: an optional display name plus a URI, as carried in
/// `From`/`To`/`P-Asserted-Identity` headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipAddress {
    pub display_name: Option<String>,
    pub uri: String,
}

impl SipAddress {
    pub fn new(display_name: Option<String>, uri: impl Into<String>) -> Self {
        Self { display_name, uri: uri.into() }
    }

    pub fn from_uri(uri: &Uri) -> Self {
        Self { display_name: None, uri: uri.to_string() }
    }
}

impl fmt::Display for SipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "\"{}\" <{}>", name, self.uri),
            None => write!(f, "<{}>", self.uri),
        }
    }
}

/// Generate an opaque tag per RFC 3261 §19.3: a cryptographically
/// uninteresting random token unique enough per dialog.
pub fn generate_tag() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..10)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Build a session id as `call-id` concatenated with the local tag (§3).
pub fn session_id(call_id: &str, local_tag: &str) -> String {
    format!("{call_id}{local_tag}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_nonempty_and_vary() {
        let a = generate_tag();
        let b = generate_tag();
        assert_eq!(a.len(), 10);
        assert_ne!(a, b);
    }

    #[test]
    fn session_id_concatenates() {
        assert_eq!(session_id("callid123", "tagXYZ"), "callid123tagXYZ");
    }

    #[test]
    fn display_formats_with_and_without_name() {
        let a = SipAddress::new(Some("Alice".into()), "sip:alice@example.com");
        assert_eq!(a.to_string(), "\"Alice\" <sip:alice@example.com>");
        let b = SipAddress::new(None, "sip:bob@example.com");
        assert_eq!(b.to_string(), "<sip:bob@example.com>");
    }
}
