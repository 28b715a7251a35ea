//! Payload encoding shared by both tunnels.
//!
//! Raw bytes travel as standard base64 inside the `data` field of an item.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::relay::Fields;

/// Field carrying base64 bytes on shell channels.
pub const DATA_FIELD: &str = "data";

/// Encode raw bytes for the relay.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a relayed payload.
pub fn decode(text: &str) -> Option<Vec<u8>> {
    STANDARD.decode(text).ok()
}

/// Build `{data: base64(bytes)}`.
pub fn data_fields(bytes: &[u8]) -> Fields {
    let mut fields = Fields::new();
    fields.insert(DATA_FIELD.to_string(), Value::String(encode(bytes)));
    fields
}

/// Extract and decode the `data` field. `None` for malformed items.
pub fn data_from(fields: &Fields) -> Option<Vec<u8>> {
    fields.get(DATA_FIELD)?.as_str().and_then(decode)
}

/// Record published on a session's `state` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum SessionStatus {
    /// Server side is up. HTTP sessions started for one port carry it.
    Connected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
    /// Client side is up.
    ClientConnected,
    /// Served shell terminated.
    Exited { code: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::to_fields;
    use serde_json::json;

    #[test]
    fn test_data_fields() {
        let fields = data_fields(b"ls -la\n");
        assert_eq!(fields.get("data"), Some(&json!("bHMgLWxhCg==")));
        assert_eq!(data_from(&fields).unwrap(), b"ls -la\n");
    }

    #[test]
    fn test_binary_payload_preserved() {
        let bytes: Vec<u8> = (0..=255).collect();
        assert_eq!(decode(&encode(&bytes)).unwrap(), bytes);
        assert_eq!(decode(&encode(&[])).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_malformed_data() {
        let mut fields = Fields::new();
        assert!(data_from(&fields).is_none());

        fields.insert("data".into(), json!(12));
        assert!(data_from(&fields).is_none());

        fields.insert("data".into(), json!("%%%"));
        assert!(data_from(&fields).is_none());
    }

    #[test]
    fn test_status_records() {
        assert_eq!(
            to_fields(&SessionStatus::Connected { port: None }).unwrap(),
            to_fields(&json!({"status": "connected"})).unwrap()
        );
        assert_eq!(
            to_fields(&SessionStatus::Connected { port: Some(8080) }).unwrap(),
            to_fields(&json!({"status": "connected", "port": 8080})).unwrap()
        );
        assert_eq!(
            to_fields(&SessionStatus::ClientConnected).unwrap(),
            to_fields(&json!({"status": "client-connected"})).unwrap()
        );
        assert_eq!(
            to_fields(&SessionStatus::Exited { code: 3 }).unwrap(),
            to_fields(&json!({"status": "exited", "code": 3})).unwrap()
        );
    }
}
