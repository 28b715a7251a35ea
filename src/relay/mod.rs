//! Relay store abstraction.
//!
//! The relay store is an external, eventually-consistent key/value service
//! used as an ordered mailbox. This module defines the contract every store
//! implements ([`RelayStore`]) and the typed [`RelayChannel`] wrapper the
//! tunnels talk to.
//!
//! ## Contract
//!
//! - `append(path, fields)` adds a child under `path` and returns its
//!   store-assigned, insertion-ordered id.
//! - `subscribe(path)` yields every child currently present and every child
//!   appended afterwards, once each, in insertion order.
//! - `delete(path, id)` removes a child so it is not redelivered.
//! - `set(path, fields)` overwrites a record value (used for `state`).
//!
//! There are no transactions and no exactly-once guarantee: consumption is
//! best effort.

mod firebase;
mod memory;

pub use firebase::FirebaseStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::TunnelError;
use crate::session::{session_path, Feature, SessionId};
use crate::Result;

/// Payload of a relay item: a JSON object.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// One child delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayItem {
    /// Store-assigned, insertion-ordered key.
    pub id: String,
    /// Item payload. Immutable once appended.
    pub fields: Fields,
}

/// Stream of items appended under one path.
///
/// Dropping the subscription stops delivery.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<RelayItem>,
}

impl Subscription {
    /// Create a subscription fed by `rx`.
    pub fn new(rx: mpsc::UnboundedReceiver<RelayItem>) -> Self {
        Self { rx }
    }

    /// Wait for the next item. Returns `None` once the store side is gone.
    pub async fn next(&mut self) -> Option<RelayItem> {
        self.rx.recv().await
    }
}

/// Ordered, push-notified mailbox store.
#[async_trait]
pub trait RelayStore: Send + Sync {
    /// Append a child under `path`, returning its id.
    async fn append(&self, path: &str, fields: Fields) -> Result<String>;

    /// Subscribe to children of `path`, existing ones first.
    async fn subscribe(&self, path: &str) -> Result<Subscription>;

    /// Remove the child `id` under `path`.
    async fn delete(&self, path: &str, id: &str) -> Result<()>;

    /// Overwrite the record stored at `path`.
    async fn set(&self, path: &str, fields: Fields) -> Result<()>;
}

/// Convert a serializable record into item fields.
pub fn to_fields<T: Serialize>(record: &T) -> Result<Fields> {
    match serde_json::to_value(record)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(TunnelError::Relay(format!(
            "relay records must be JSON objects, got {}",
            other
        ))),
    }
}

/// A typed handle on a single path of the relay store.
#[derive(Clone)]
pub struct RelayChannel {
    store: Arc<dyn RelayStore>,
    path: String,
}

impl RelayChannel {
    pub fn new(store: Arc<dyn RelayStore>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Append an item. No acknowledgment of remote delivery.
    pub async fn append(&self, fields: Fields) -> Result<String> {
        self.store.append(&self.path, fields).await
    }

    /// Append a serializable record.
    pub async fn append_record<T: Serialize>(&self, record: &T) -> Result<String> {
        self.append(to_fields(record)?).await
    }

    /// Subscribe to items appended to this channel.
    pub async fn subscribe(&self) -> Result<Subscription> {
        self.store.subscribe(&self.path).await
    }

    /// Delete a delivered item so it is never re-read.
    pub async fn consume(&self, id: &str) -> Result<()> {
        self.store.delete(&self.path, id).await
    }

    /// Overwrite this path's value with a serializable record.
    pub async fn set_record<T: Serialize>(&self, record: &T) -> Result<()> {
        self.store.set(&self.path, to_fields(record)?).await
    }
}

/// The `input` / `output` / `state` triple of one session.
#[derive(Clone)]
pub struct SessionChannels {
    /// Client to server.
    pub input: RelayChannel,
    /// Server to client.
    pub output: RelayChannel,
    /// Last published status of either side.
    pub state: RelayChannel,
}

impl SessionChannels {
    pub fn new(store: Arc<dyn RelayStore>, feature: Feature, session_id: &SessionId) -> Self {
        let root = session_path(feature, session_id);
        Self {
            input: RelayChannel::new(Arc::clone(&store), format!("{}/input", root)),
            output: RelayChannel::new(Arc::clone(&store), format!("{}/output", root)),
            state: RelayChannel::new(store, format!("{}/state", root)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_fields_object() {
        #[derive(Serialize)]
        struct Record {
            data: &'static str,
        }
        let fields = to_fields(&Record { data: "aGk=" }).unwrap();
        assert_eq!(fields.get("data"), Some(&json!("aGk=")));
    }

    #[test]
    fn test_to_fields_rejects_scalars() {
        assert!(to_fields(&42).is_err());
        assert!(to_fields(&"text").is_err());
    }

    #[test]
    fn test_session_channel_paths() {
        let store: Arc<dyn RelayStore> = Arc::new(MemoryStore::new());
        let id: SessionId = "s1".parse().unwrap();
        let channels = SessionChannels::new(store, Feature::Http, &id);
        assert_eq!(channels.input.path(), "sessions/s1/http/input");
        assert_eq!(channels.output.path(), "sessions/s1/http/output");
        assert_eq!(channels.state.path(), "sessions/s1/http/state");
    }

    #[tokio::test]
    async fn test_channel_append_subscribe_consume() {
        let store = Arc::new(MemoryStore::new());
        let channel = RelayChannel::new(store.clone(), "sessions/t/shell/input");

        let mut sub = channel.subscribe().await.unwrap();
        let id = channel
            .append(to_fields(&json!({"data": "YQ=="})).unwrap())
            .await
            .unwrap();

        let item = sub.next().await.unwrap();
        assert_eq!(item.id, id);
        assert_eq!(item.fields.get("data"), Some(&json!("YQ==")));

        channel.consume(&item.id).await.unwrap();
        assert_eq!(store.len("sessions/t/shell/input"), 0);
    }
}
