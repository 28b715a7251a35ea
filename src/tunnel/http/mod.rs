//! Request/response tunnel for HTTP.
//!
//! The client role ([`ProxyClient`]) listens locally, turns each request
//! into a [`RelayedRequest`] on `input` and waits for the matching
//! [`RelayedResponse`] on `output`. The server role ([`HttpForwarder`])
//! performs the real call against a local port and relays the result.

mod client;
mod pending;
mod server;
mod types;

pub use client::{resolve_target, ProxyClient, ProxySettings};
pub use pending::{PendingRequests, PendingResponse};
pub use server::HttpForwarder;
pub use types::{
    header_fields, header_map, is_connection_header, HeaderField, HeaderFields, RelayedRequest,
    RelayedResponse, CONNECTION_HEADERS,
};
