//! Firebase Realtime Database relay store (REST + streaming).
//!
//! Writes map onto plain REST verbs against `<base>/<path>.json`:
//! `POST` appends a child and returns its push id, `PUT` overwrites and
//! `DELETE` removes. Subscriptions hold a `text/event-stream` GET open and
//! turn `put`/`patch` events into child deliveries. When the stream drops
//! it is reopened after a fixed delay; items appended during the gap are
//! picked up from the fresh snapshot, items consumed during it are not.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::{header::ACCEPT, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{Fields, RelayItem, RelayStore, Subscription};
use crate::error::TunnelError;
use crate::Result;

/// Default pause before reopening a dropped subscription stream.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Relay store backed by a Firebase Realtime Database.
#[derive(Clone)]
pub struct FirebaseStore {
    client: reqwest::Client,
    base_url: String,
    auth: Option<String>,
    reconnect_delay: Duration,
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

#[derive(Deserialize)]
struct StreamPayload {
    path: String,
    #[serde(default)]
    data: Value,
}

/// What a single streaming event means for the set of children.
#[derive(Debug, PartialEq)]
enum ChildChange {
    /// Full snapshot of the path (initial `put` at `/`).
    Replace(Vec<RelayItem>),
    /// One child added or rewritten.
    Upsert(RelayItem),
    /// One child removed.
    Remove(String),
}

enum StreamEnd {
    ReceiverGone,
    Closed,
}

impl FirebaseStore {
    /// Create a store for the database at `base_url`.
    ///
    /// `auth` is sent as the `auth` query parameter when present.
    pub fn new(base_url: impl Into<String>, auth: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("relay-tunnel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        })
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.auth {
            Some(auth) => builder.query(&[("auth", auth)]),
            None => builder,
        }
    }

    async fn run_subscription(self, path: String, tx: mpsc::UnboundedSender<RelayItem>) {
        let mut delivered = HashSet::new();
        loop {
            match self.stream_once(&path, &tx, &mut delivered).await {
                Ok(StreamEnd::ReceiverGone) => {
                    debug!(path = %path, "subscription dropped by receiver");
                    return;
                }
                Ok(StreamEnd::Closed) => debug!(path = %path, "relay stream closed"),
                Err(e) => warn!(path = %path, error = %e, "relay stream failed"),
            }
            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn stream_once(
        &self,
        path: &str,
        tx: &mpsc::UnboundedSender<RelayItem>,
        delivered: &mut HashSet<String>,
    ) -> Result<StreamEnd> {
        let response = self
            .request(Method::GET, path)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let mut events = Box::pin(response.bytes_stream().eventsource());

        loop {
            let event = tokio::select! {
                event = events.next() => event,
                _ = tx.closed() => return Ok(StreamEnd::ReceiverGone),
            };
            let Some(event) = event else {
                return Ok(StreamEnd::Closed);
            };
            let event = event.map_err(|e| TunnelError::Relay(format!("event stream: {e}")))?;
            trace!(path = %path, event = %event.event, "relay event");
            match event.event.as_str() {
                "put" | "patch" => {
                    let changes = parse_changes(&event.event, &event.data)?;
                    if !apply_changes(changes, tx, delivered) {
                        return Ok(StreamEnd::ReceiverGone);
                    }
                }
                "cancel" | "auth_revoked" => {
                    return Err(TunnelError::Relay(format!(
                        "stream {}: {}",
                        event.event, event.data
                    )));
                }
                _ => {}
            }
        }
    }
}

/// Deliver new children, returning `false` once the receiver is gone.
fn apply_changes(
    changes: Vec<ChildChange>,
    tx: &mpsc::UnboundedSender<RelayItem>,
    delivered: &mut HashSet<String>,
) -> bool {
    for change in changes {
        match change {
            ChildChange::Replace(items) => {
                delivered.retain(|id| items.iter().any(|item| &item.id == id));
                for item in items {
                    if delivered.insert(item.id.clone()) && tx.send(item).is_err() {
                        return false;
                    }
                }
            }
            ChildChange::Upsert(item) => {
                if delivered.insert(item.id.clone()) && tx.send(item).is_err() {
                    return false;
                }
            }
            ChildChange::Remove(id) => {
                delivered.remove(&id);
            }
        }
    }
    true
}

fn child_item(id: &str, value: Value) -> Option<RelayItem> {
    match value {
        Value::Object(fields) => Some(RelayItem {
            id: id.to_string(),
            fields,
        }),
        _ => None,
    }
}

fn sorted_children(map: Fields) -> Vec<(String, Value)> {
    let mut children: Vec<_> = map.into_iter().collect();
    children.sort_by(|a, b| a.0.cmp(&b.0));
    children
}

/// Interpret one `put`/`patch` payload relative to the subscribed path.
fn parse_changes(kind: &str, data: &str) -> Result<Vec<ChildChange>> {
    let payload: StreamPayload = serde_json::from_str(data)?;
    let segments: Vec<&str> = payload
        .path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    let changes = match (segments.as_slice(), payload.data) {
        ([], Value::Null) if kind == "put" => vec![ChildChange::Replace(Vec::new())],
        ([], Value::Object(map)) if kind == "put" => {
            let items = sorted_children(map)
                .into_iter()
                .filter_map(|(id, value)| child_item(&id, value))
                .collect();
            vec![ChildChange::Replace(items)]
        }
        ([], Value::Object(map)) => sorted_children(map)
            .into_iter()
            .filter_map(|(id, value)| match value {
                Value::Null => Some(ChildChange::Remove(id)),
                value => child_item(&id, value).map(ChildChange::Upsert),
            })
            .collect(),
        ([id], Value::Null) => vec![ChildChange::Remove(id.to_string())],
        ([id], value) => child_item(id, value)
            .map(ChildChange::Upsert)
            .into_iter()
            .collect(),
        // Writes below a child are partial updates; items are immutable.
        _ => Vec::new(),
    };
    Ok(changes)
}

#[async_trait]
impl RelayStore for FirebaseStore {
    async fn append(&self, path: &str, fields: Fields) -> Result<String> {
        let response: PushResponse = self
            .request(Method::POST, path)
            .json(&fields)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.name)
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().run_subscription(path.to_string(), tx));
        Ok(Subscription::new(rx))
    }

    async fn delete(&self, path: &str, id: &str) -> Result<()> {
        let child = format!("{}/{}", path.trim_end_matches('/'), id);
        self.request(Method::DELETE, &child)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<()> {
        self.request(Method::PUT, path)
            .json(&fields)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
