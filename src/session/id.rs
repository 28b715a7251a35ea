//! Session and request identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TunnelError;

/// Longest session id accepted.
const MAX_LEN: usize = 128;

/// Characters the relay store does not allow inside a path segment.
const FORBIDDEN: &[char] = &['.', '$', '#', '[', ']', '/'];

/// Caller-supplied identifier of a tunnel session.
///
/// Session ids become a path segment in the relay store, so they must be
/// non-empty, reasonably short, and free of the store's reserved characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> bool {
        !s.is_empty()
            && s.len() <= MAX_LEN
            && !s.chars().any(|c| c.is_control() || FORBIDDEN.contains(&c))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::validate(s) {
            Ok(SessionId(s.to_string()))
        } else {
            Err(TunnelError::InvalidSessionId(s.to_string()))
        }
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Generate a fresh correlation id for a relayed HTTP request.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
