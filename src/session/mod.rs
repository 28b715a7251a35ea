//! Session identity.
//!
//! A session is one logical tunnel, named by a caller-supplied id and a
//! feature kind. Both ends derive the same relay path from that pair.

mod feature;
mod id;

pub use feature::Feature;
pub use id::{new_request_id, SessionId};

/// Root path under which every session's channels live.
pub const SESSIONS_ROOT: &str = "sessions";

/// Relay path holding the `input`, `output` and `state` channels of a session.
pub fn session_path(feature: Feature, session_id: &SessionId) -> String {
    format!("{}/{}/{}", SESSIONS_ROOT, session_id, feature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_path() {
        let id: SessionId = "demo".parse().unwrap();
        assert_eq!(session_path(Feature::Shell, &id), "sessions/demo/shell");
        assert_eq!(session_path(Feature::Http, &id), "sessions/demo/http");
    }
}
