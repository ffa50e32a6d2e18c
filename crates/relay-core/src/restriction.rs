//! Recognizing "this cannot be forwarded" failures.
//!
//! Clients that expose a structured error should map it to
//! `Error::Restricted` directly. Matching on platform error text is a
//! fallback: it couples us to wording we do not control.

use crate::errors::Error;

/// Substrings of platform error text that mean the source forbids forwarding.
pub const RESTRICTION_MARKERS: [&str; 2] = ["CHAT_FORWARDS_RESTRICTED", "protected"];

pub fn is_restricted_text(text: &str) -> bool {
    RESTRICTION_MARKERS.iter().any(|m| text.contains(m))
}

/// Build a core error from client error text.
pub fn classify(text: impl Into<String>) -> Error {
    let text = text.into();
    if is_restricted_text(&text) {
        Error::Restricted(text)
    } else {
        Error::External(text)
    }
}
