// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Cross-process channel
//!
//! A duplex pipe between the host process and the loader context carrying
//! newline-delimited JSON envelopes:
//!
//! - `{ "event": name, "args": [...] }` delivers a named event
//! - `{ "sync": true, "prop": key, "value": v }` mirrors a shared-state write
//!
//! Reader and writer run as detached tasks; they never keep the runtime
//! alive on their own and end when the pipe closes.

mod state;

pub use state::SharedState;

use crate::error::{EngineError, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Event the host sends with the engine configuration
pub const INITIALIZE_EVENT: &str = "initialize";

/// Event emitted after every bundle
pub const BUNDLE_EVENT: &str = "bundle";

/// Most unlistened events held at once; the oldest is dropped past this
pub const BACKLOG_LIMIT: usize = 64;

/// A message on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Shared-state write
    Sync {
        /// Always `true` on the wire
        #[serde(deserialize_with = "sync_marker")]
        sync: bool,
        /// Key written
        prop: String,
        /// New value; a missing value writes `null`
        #[serde(default)]
        value: Value,
    },
    /// Named event
    Event {
        /// Event name
        event: String,
        /// Event arguments
        #[serde(default)]
        args: Vec<Value>,
    },
}

impl Envelope {
    /// A shared-state write
    pub fn sync(prop: impl Into<String>, value: Value) -> Self {
        Self::Sync {
            sync: true,
            prop: prop.into(),
            value,
        }
    }

    /// A named event
    pub fn event(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Event {
            event: event.into(),
            args,
        }
    }
}

fn sync_marker<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match bool::deserialize(deserializer)? {
        true => Ok(true),
        false => Err(serde::de::Error::custom("sync marker must be true")),
    }
}

type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;

#[derive(Default)]
struct Pending {
    waiters: HashMap<String, Vec<oneshot::Sender<Vec<Value>>>>,
    /// Events that arrived before anyone listened for them
    backlog: VecDeque<(String, Vec<Value>)>,
    closed: bool,
}

impl Pending {
    fn take_backlog(&mut self, event: &str) -> Vec<Vec<Value>> {
        let mut taken = Vec::new();
        self.backlog.retain(|(name, args)| {
            if name == event {
                taken.push(args.clone());
                false
            } else {
                true
            }
        });
        taken
    }

    fn hold(&mut self, event: String, args: Vec<Value>) {
        if self.backlog.len() == BACKLOG_LIMIT {
            if let Some((dropped, _)) = self.backlog.pop_front() {
                debug!("Backlog full, dropping unlistened '{}'", dropped);
            }
        }
        self.backlog.push_back((event, args));
    }
}

#[derive(Default)]
struct Listeners {
    persistent: RwLock<HashMap<String, Vec<Listener>>>,
    pending: Mutex<Pending>,
}

impl Listeners {
    fn dispatch(&self, event: String, args: Vec<Value>) {
        let (listeners, waiters) = {
            let mut pending = self.pending.lock();
            let listeners = self.persistent.read().get(&event).cloned().unwrap_or_default();
            let waiters = pending.waiters.remove(&event).unwrap_or_default();
            if listeners.is_empty() && waiters.is_empty() {
                debug!("Holding event '{}' until a listener registers", event);
                pending.hold(event, args);
                return;
            }
            (listeners, waiters)
        };

        for listener in &listeners {
            listener(&args);
        }
        for waiter in waiters {
            let _ = waiter.send(args.clone());
        }
    }

    fn close(&self) {
        let mut pending = self.pending.lock();
        pending.closed = true;
        pending.waiters.clear();
    }
}

/// One end of the cross-process channel
#[derive(Clone)]
pub struct Channel {
    outbound: mpsc::UnboundedSender<Envelope>,
    listeners: Arc<Listeners>,
    state: SharedState,
}

impl Channel {
    /// Attach to a reader/writer pair and start the pump tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, mut queue) = mpsc::unbounded_channel::<Envelope>();
        let listeners = Arc::new(Listeners::default());
        let state = SharedState::new(outbound.clone());

        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(envelope) = queue.recv().await {
                let mut line = match serde_json::to_string(&envelope) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Dropping unserializable message: {}", e);
                        continue;
                    }
                };
                line.push('\n');
                if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err() {
                    debug!("Channel writer closed");
                    break;
                }
            }
        });

        let inbound = listeners.clone();
        let mirror = state.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match serde_json::from_str::<Envelope>(&line) {
                        Ok(Envelope::Sync { prop, value, .. }) => mirror.apply_remote(&prop, value),
                        Ok(Envelope::Event { event, args }) => inbound.dispatch(event, args),
                        Err(e) => warn!("Ignoring malformed channel message: {}", e),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Channel read failed: {}", e);
                        break;
                    }
                }
            }
            // Pending `once` futures resolve with an error
            inbound.close();
            debug!("Channel reader closed");
        });

        Self {
            outbound,
            listeners,
            state,
        }
    }

    /// Fire-and-forget a named event to the other side
    pub fn send(&self, event: &str, args: Vec<Value>) -> Result<()> {
        self.outbound
            .send(Envelope::event(event, args))
            .map_err(|_| EngineError::channel("channel is closed"))
    }

    /// Call `listener` for every delivery of `event`
    pub fn on<F>(&self, event: &str, listener: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let backlog = {
            let mut pending = self.listeners.pending.lock();
            self.listeners
                .persistent
                .write()
                .entry(event.to_string())
                .or_default()
                .push(listener.clone());
            pending.take_backlog(event)
        };
        for args in backlog {
            listener(&args);
        }
    }

    /// Wait for the next delivery of `event`
    pub async fn once(&self, event: &str) -> Result<Vec<Value>> {
        let receiver = {
            let mut pending = self.listeners.pending.lock();
            let position = pending.backlog.iter().position(|(name, _)| name == event);
            if let Some((_, args)) = position.and_then(|i| pending.backlog.remove(i)) {
                return Ok(args);
            }
            if pending.closed {
                return Err(EngineError::channel("channel is closed"));
            }
            let (sender, receiver) = oneshot::channel();
            pending.waiters.entry(event.to_string()).or_default().push(sender);
            receiver
        };

        receiver
            .await
            .map_err(|_| EngineError::channel(format!("channel closed before '{}' arrived", event)))
    }

    /// The shared key/value mirror
    pub fn state(&self) -> &SharedState {
        &self.state
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.outbound.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{duplex, split};

    fn pair() -> (Channel, Channel) {
        let (a, b) = duplex(4096);
        let (a_read, a_write) = split(a);
        let (b_read, b_write) = split(b);
        (Channel::connect(a_read, a_write), Channel::connect(b_read, b_write))
    }

    #[test]
    fn test_envelope_wire_shape() {
        let sync = serde_json::to_value(Envelope::sync("k", json!(1))).unwrap();
        assert_eq!(sync, json!({ "sync": true, "prop": "k", "value": 1 }));

        let event: Envelope = serde_json::from_str(r#"{ "event": "bundle", "args": ["a"] }"#).unwrap();
        assert_eq!(event, Envelope::event("bundle", vec![json!("a")]));

        let bare: Envelope = serde_json::from_str(r#"{ "event": "ready" }"#).unwrap();
        assert_eq!(bare, Envelope::event("ready", Vec::new()));
    }

    #[test]
    fn test_sync_envelope_validation() {
        let cleared: Envelope = serde_json::from_str(r#"{ "sync": true, "prop": "k" }"#).unwrap();
        assert_eq!(cleared, Envelope::sync("k", Value::Null));

        let not_sync = serde_json::from_str::<Envelope>(r#"{ "sync": false, "prop": "k", "value": 1 }"#);
        assert!(not_sync.is_err());
    }

    #[tokio::test]
    async fn test_event_round_trip() {
        let (host, loader) = pair();
        host.send(INITIALIZE_EVENT, vec![json!({ "cwd": "/proj" })]).unwrap();

        let args = loader.once(INITIALIZE_EVENT).await.unwrap();
        assert_eq!(args, vec![json!({ "cwd": "/proj" })]);
    }

    #[tokio::test]
    async fn test_listeners_receive_every_delivery() {
        let (host, loader) = pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        host.on("bundle", move |args| {
            let _ = tx.send(args.to_vec());
        });

        loader.send("bundle", vec![json!("a")]).unwrap();
        loader.send("bundle", vec![json!("b")]).unwrap();

        assert_eq!(rx.recv().await.unwrap(), vec![json!("a")]);
        assert_eq!(rx.recv().await.unwrap(), vec![json!("b")]);
    }

    #[tokio::test]
    async fn test_state_sync_without_echo() {
        let (host, loader) = pair();

        let (host_tx, mut host_rx) = mpsc::unbounded_channel();
        host.state().subscribe(move |prop, value| {
            let _ = host_tx.send((prop.to_string(), value.clone()));
        });
        let (loader_tx, mut loader_rx) = mpsc::unbounded_channel();
        loader.state().subscribe(move |prop, _| {
            let _ = loader_tx.send(prop.to_string());
        });

        loader.state().set("progress", json!(50)).unwrap();
        assert_eq!(loader.state().get("progress"), Some(json!(50)));

        assert_eq!(host_rx.recv().await.unwrap(), ("progress".to_string(), json!(50)));
        assert_eq!(host.state().get("progress"), Some(json!(50)));

        // Anything echoed back would arrive before this event
        host.send("ping", Vec::new()).unwrap();
        loader.once("ping").await.unwrap();

        assert_eq!(loader_rx.recv().await.unwrap(), "progress");
        assert!(loader_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unlistened_events_are_bounded() {
        let (host, loader) = pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        host.on("done", move |_| {
            let _ = tx.send(());
        });

        for i in 0..BACKLOG_LIMIT * 3 {
            loader.send("noise", vec![json!(i)]).unwrap();
        }
        loader.send("done", Vec::new()).unwrap();
        rx.recv().await.unwrap();

        assert_eq!(host.listeners.pending.lock().backlog.len(), BACKLOG_LIMIT);
        // Oldest entries went first
        let args = host.once("noise").await.unwrap();
        assert_eq!(args, vec![json!(BACKLOG_LIMIT * 2)]);
    }

    #[tokio::test]
    async fn test_once_fails_when_pipe_closes() {
        let (a, b) = duplex(64);
        let (a_read, a_write) = split(a);
        let channel = Channel::connect(a_read, a_write);
        drop(b);

        assert!(channel.once(INITIALIZE_EVENT).await.is_err());
    }
}
