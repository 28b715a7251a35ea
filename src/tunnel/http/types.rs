//! Wire records of the HTTP tunnel.

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::relay::Fields;
use crate::tunnel::payload;

/// Headers that describe one hop's connection and are never replayed.
pub const CONNECTION_HEADERS: [&str; 6] = [
    "host",
    "content-length",
    "transfer-encoding",
    "connection",
    "expect",
    "upgrade",
];

/// Case-insensitive check against [`CONNECTION_HEADERS`].
pub fn is_connection_header(name: &str) -> bool {
    CONNECTION_HEADERS
        .iter()
        .any(|header| header.eq_ignore_ascii_case(name))
}

/// One header name's value(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderField {
    One(String),
    Many(Vec<String>),
}

impl HeaderField {
    pub fn values(&self) -> &[String] {
        match self {
            HeaderField::One(value) => std::slice::from_ref(value),
            HeaderField::Many(values) => values,
        }
    }
}

/// Header map as relayed: repeated headers become a list.
pub type HeaderFields = BTreeMap<String, HeaderField>;

/// Group a header map by name. Names come out lowercase.
pub fn header_fields(headers: &HeaderMap) -> HeaderFields {
    let mut fields = HeaderFields::new();
    for name in headers.keys() {
        let mut values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();
        let field = if values.len() == 1 {
            HeaderField::One(values.remove(0))
        } else {
            HeaderField::Many(values)
        };
        fields.insert(name.as_str().to_string(), field);
    }
    fields
}

/// Expand relayed headers into a header map, one line per value.
///
/// Connection headers and entries that are not valid HTTP are dropped.
pub fn header_map(fields: &HeaderFields) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, field) in fields {
        if is_connection_header(name) {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in field.values() {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
    headers
}

/// A local HTTP request carried over `input`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedRequest {
    pub req_id: String,
    /// Target port on the server host.
    #[serde(deserialize_with = "lenient_port")]
    pub port: u16,
    pub method: String,
    /// Path and query, starting with `/`.
    pub uri: String,
    #[serde(default)]
    pub headers: HeaderFields,
    /// Base64 request body.
    #[serde(default)]
    pub body: String,
}

impl RelayedRequest {
    /// Parse an `input` item. `None` when required fields are missing.
    pub fn from_fields(fields: Fields) -> Option<Self> {
        serde_json::from_value(Value::Object(fields)).ok()
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        payload::decode(&self.body).unwrap_or_default()
    }
}

/// The outcome of a relayed request carried over `output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedResponse {
    pub req_id: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: HeaderFields,
    /// Base64 response body.
    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    500
}

impl RelayedResponse {
    pub fn new(req_id: impl Into<String>, status: u16, headers: HeaderFields, body: &[u8]) -> Self {
        Self {
            req_id: req_id.into(),
            status,
            headers,
            body: payload::encode(body),
        }
    }

    /// Synthetic response for a request nobody answered in time.
    pub fn timeout(req_id: impl Into<String>) -> Self {
        Self::new(req_id, 504, HeaderFields::new(), b"Timeout")
    }

    /// Response for a local call that failed before producing a response.
    pub fn bad_gateway(req_id: impl Into<String>, message: &str) -> Self {
        Self::new(
            req_id,
            502,
            HeaderFields::new(),
            format!("Error: {}", message).as_bytes(),
        )
    }

    /// Parse an `output` item. `None` when `reqId` is missing.
    pub fn from_fields(fields: Fields) -> Option<Self> {
        serde_json::from_value(Value::Object(fields)).ok()
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        payload::decode(&self.body).unwrap_or_default()
    }
}

/// Accept a port as a JSON number or a decimal string.
fn lenient_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let port = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    };
    match port {
        Some(port) if port != 0 => Ok(port),
        _ => Err(de::Error::custom("port must be a number between 1 and 65535")),
    }
}
