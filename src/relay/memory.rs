//! In-process relay store.
//!
//! Keeps the same ordering contract as the remote store: one lock covers
//! both the child map and the subscriber list of a path, so every subscriber
//! observes appends in exactly the order they were assigned ids.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Fields, RelayItem, RelayStore, Subscription};
use crate::error::TunnelError;
use crate::Result;

#[derive(Default)]
struct PathState {
    children: BTreeMap<String, Fields>,
    subscribers: Vec<mpsc::UnboundedSender<RelayItem>>,
    value: Option<Fields>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    paths: HashMap<String, PathState>,
}

/// Relay store living entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of children currently stored under `path`.
    pub fn len(&self, path: &str) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.paths.get(path).map_or(0, |p| p.children.len()))
            .unwrap_or(0)
    }

    /// Whether `path` currently holds no children.
    pub fn is_empty(&self, path: &str) -> bool {
        self.len(path) == 0
    }

    /// Record last written with `set` at `path`.
    pub fn value(&self, path: &str) -> Option<Fields> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.paths.get(path).and_then(|p| p.value.clone()))
    }
}

#[async_trait]
impl RelayStore for MemoryStore {
    async fn append(&self, path: &str, fields: Fields) -> Result<String> {
        let mut inner = self.inner.lock().map_err(|_| TunnelError::LockPoisoned)?;
        inner.next_id += 1;
        // Zero padding keeps lexical order equal to insertion order.
        let id = format!("{:016x}", inner.next_id);

        let state = inner.paths.entry(path.to_string()).or_default();
        state.children.insert(id.clone(), fields.clone());

        let item = RelayItem {
            id: id.clone(),
            fields,
        };
        state
            .subscribers
            .retain(|tx| tx.send(item.clone()).is_ok());

        Ok(id)
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        let mut inner = self.inner.lock().map_err(|_| TunnelError::LockPoisoned)?;
        let state = inner.paths.entry(path.to_string()).or_default();

        let (tx, rx) = mpsc::unbounded_channel();
        for (id, fields) in &state.children {
            let _ = tx.send(RelayItem {
                id: id.clone(),
                fields: fields.clone(),
            });
        }
        state.subscribers.push(tx);

        Ok(Subscription::new(rx))
    }

    async fn delete(&self, path: &str, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| TunnelError::LockPoisoned)?;
        if let Some(state) = inner.paths.get_mut(path) {
            state.children.remove(id);
        }
        Ok(())
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| TunnelError::LockPoisoned)?;
        inner.paths.entry(path.to_string()).or_default().value = Some(fields);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(n: u64) -> Fields {
        let mut map = Fields::new();
        map.insert("n".into(), json!(n));
        map
    }

    #[tokio::test]
    async fn test_existing_children_delivered_first() {
        let store = MemoryStore::new();
        store.append("p", fields(1)).await.unwrap();
        store.append("p", fields(2)).await.unwrap();

        let mut sub = store.subscribe("p").await.unwrap();
        store.append("p", fields(3)).await.unwrap();

        for expected in 1..=3u64 {
            let item = sub.next().await.unwrap();
            assert_eq!(item.fields["n"], json!(expected));
        }
    }

    #[tokio::test]
    async fn test_ids_are_ordered() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for n in 0..50 {
            ids.push(store.append("p", fields(n)).await.unwrap());
        }
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_deleted_children_not_redelivered() {
        let store = MemoryStore::new();
        let id = store.append("p", fields(1)).await.unwrap();
        store.append("p", fields(2)).await.unwrap();
        store.delete("p", &id).await.unwrap();

        let mut sub = store.subscribe("p").await.unwrap();
        let item = sub.next().await.unwrap();
        assert_eq!(item.fields["n"], json!(2));
        assert_eq!(store.len("p"), 1);
    }

    #[tokio::test]
    async fn test_paths_are_isolated() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("a").await.unwrap();
        store.append("b", fields(1)).await.unwrap();
        store.append("a", fields(2)).await.unwrap();

        let item = sub.next().await.unwrap();
        assert_eq!(item.fields["n"], json!(2));
        assert!(store.is_empty("c"));
    }

    #[tokio::test]
    async fn test_set_overwrites_value() {
        let store = MemoryStore::new();
        assert!(store.value("s").is_none());
        store.set("s", fields(1)).await.unwrap();
        store.set("s", fields(2)).await.unwrap();
        assert_eq!(store.value("s").unwrap()["n"], json!(2));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_pruned() {
        let store = MemoryStore::new();
        let sub = store.subscribe("p").await.unwrap();
        drop(sub);
        store.append("p", fields(1)).await.unwrap();
        let inner = store.inner.lock().unwrap();
        assert!(inner.paths["p"].subscribers.is_empty());
    }
}
