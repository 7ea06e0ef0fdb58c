// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Shared key/value mirror

use super::Envelope;
use crate::error::{EngineError, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

type Subscriber = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Key/value store mirrored on both ends of a [`Channel`](super::Channel)
///
/// A local write lands in the local copy immediately and is then sent to
/// the remote side. Writes arriving from the remote side are applied
/// without being sent back.
#[derive(Clone)]
pub struct SharedState {
    values: Arc<RwLock<BTreeMap<String, Value>>>,
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl SharedState {
    pub(super) fn new(outbound: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            values: Arc::new(RwLock::new(BTreeMap::new())),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            outbound,
        }
    }

    /// Current value of `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Write `key` locally and broadcast it
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        self.apply(key, value.clone());
        self.outbound
            .send(Envelope::sync(key, value))
            .map_err(|_| EngineError::channel("channel is closed"))
    }

    /// Call `subscriber` after every write, local or remote
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(subscriber));
    }

    /// Copy of every key and value
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.read().clone()
    }

    pub(super) fn apply_remote(&self, key: &str, value: Value) {
        self.apply(key, value);
    }

    fn apply(&self, key: &str, value: Value) {
        self.values.write().insert(key.to_string(), value.clone());
        let subscribers = self.subscribers.read().clone();
        for subscriber in subscribers {
            subscriber(key, &value);
        }
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("values", &*self.values.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local_write_is_optimistic() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = SharedState::new(tx);

        state.set("files", json!(["a.js"])).unwrap();
        assert_eq!(state.get("files"), Some(json!(["a.js"])));
        assert_eq!(rx.try_recv().unwrap(), Envelope::sync("files", json!(["a.js"])));
    }

    #[test]
    fn test_remote_write_is_not_rebroadcast() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = SharedState::new(tx);

        state.apply_remote("mode", json!("watch"));
        assert_eq!(state.snapshot().get("mode"), Some(&json!("watch")));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_set_fails_once_channel_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let state = SharedState::new(tx);

        assert!(state.set("k", json!(1)).is_err());
        assert_eq!(state.get("k"), Some(json!(1)));
    }
}
