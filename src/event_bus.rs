//! Event dispatch core
//!
//! Name-indexed pub/sub with persistent and one-shot handlers, `prefix.*` /
//! `*` wildcard routing, and a channel-backed `wait_for_next` with no
//! busy-waiting.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{error, warn};

use crate::error::EventBusError;

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Token returned by `on`/`on_next`, passed back to `off`/`off_next` to
/// remove a specific handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Entry {
    pattern: String,
    id: HandlerId,
    handler: Handler,
}

/// `prefix.*` matches any `name` starting with `prefix.`; the bare `*`
/// matches everything; anything else is an exact string match.
fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern == name {
        return true;
    }
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return name.len() > prefix.len()
            && name.starts_with(prefix)
            && name.as_bytes()[prefix.len()] == b'.';
    }
    false
}

fn is_wildcard_pattern(pattern: &str) -> bool {
    pattern == "*" || pattern.ends_with(".*")
}

/// Snapshot `entries` into (exact-match order, wildcard-match order) lists
/// for the given dispatch `name`, per the §4.1 ordering guarantee.
fn split_matches(entries: &[Entry], name: &str) -> (Vec<MatchedHandler>, Vec<MatchedHandler>) {
    let mut exact = Vec::new();
    let mut wild = Vec::new();
    for e in entries {
        if e.pattern == name {
            exact.push(MatchedHandler {
                id: e.id,
                handler: e.handler.clone(),
            });
        } else if is_wildcard_pattern(&e.pattern) && pattern_matches(&e.pattern, name) {
            wild.push(MatchedHandler {
                id: e.id,
                handler: e.handler.clone(),
            });
        }
    }
    (exact, wild)
}

struct MatchedHandler {
    #[allow(dead_code)]
    id: HandlerId,
    handler: Handler,
}

fn invoke(handler: &Handler, event: &Value) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
    if let Err(payload) = result {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        error!(%message, "event handler panicked during dispatch");
    }
}

/// Name-keyed pub/sub substrate. Cheap to clone (internally `Arc`-backed).
#[derive(Clone)]
pub struct EventBus {
    persistent: Arc<RwLock<Vec<Entry>>>,
    once: Arc<RwLock<Vec<Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            persistent: Arc::new(RwLock::new(Vec::new())),
            once: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn alloc_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a persistent handler for `name` (exact string, `prefix.*`, or `*`).
    pub fn on(&self, name: impl Into<String>, handler: Handler) -> HandlerId {
        let id = self.alloc_id();
        self.persistent.write().push(Entry {
            pattern: name.into(),
            id,
            handler,
        });
        id
    }

    /// Register a one-shot handler, consumed atomically on first matching dispatch.
    pub fn on_next(&self, name: impl Into<String>, handler: Handler) -> HandlerId {
        let id = self.alloc_id();
        self.once.write().push(Entry {
            pattern: name.into(),
            id,
            handler,
        });
        id
    }

    /// Remove a specific persistent handler, or all persistent handlers for
    /// `name` if `id` is `None`.
    pub fn off(&self, name: &str, id: Option<HandlerId>) -> Result<(), EventBusError> {
        Self::remove(&self.persistent, name, id)
    }

    /// Symmetric for one-shot handlers.
    pub fn off_next(&self, name: &str, id: Option<HandlerId>) -> Result<(), EventBusError> {
        Self::remove(&self.once, name, id)
    }

    fn remove(
        store: &Arc<RwLock<Vec<Entry>>>,
        name: &str,
        id: Option<HandlerId>,
    ) -> Result<(), EventBusError> {
        let mut entries = store.write();
        match id {
            None => {
                entries.retain(|e| e.pattern != name);
                Ok(())
            }
            Some(target) => {
                let before = entries.len();
                entries.retain(|e| !(e.pattern == name && e.id == target));
                if entries.len() == before {
                    Err(EventBusError::HandlerNotFound(name.to_string()))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Dispatch `event` under `name`. Invokes all matching persistent
    /// handlers (exact-match registration order, then wildcard registration
    /// order), then all matching one-shot handlers in the same order,
    /// consuming them. All handler calls complete before this returns.
    pub fn dispatch(&self, name: &str, event: Value) {
        let persistent_snapshot = self.persistent.read().clone_entries();
        let (exact, wild) = split_matches(&persistent_snapshot, name);
        for entry in exact.iter().chain(wild.iter()) {
            invoke(&entry.handler, &event);
        }

        let fired = {
            let mut once = self.once.write();
            let (matched, remaining): (Vec<Entry>, Vec<Entry>) = once
                .drain(..)
                .partition(|e| e.pattern == name || pattern_matches(&e.pattern, name));
            *once = remaining;
            matched
        };
        let (exact_once, wild_once) = split_matches(&fired, name);
        for entry in exact_once.iter().chain(wild_once.iter()) {
            invoke(&entry.handler, &event);
        }
    }

    /// Await the next event matching `name`. Resolves with `None` if
    /// `timeout` elapses first; the registered one-shot handler is not
    /// removed by a timeout and remains available to the next matching
    /// dispatch.
    pub async fn wait_for_next(
        &self,
        name: impl Into<String>,
        timeout: Option<std::time::Duration>,
    ) -> Option<Value> {
        let (tx, rx) = tokio::sync::oneshot::channel::<Value>();
        let tx = std::sync::Mutex::new(Some(tx));
        let handler: Handler = Arc::new(move |event: &Value| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(event.clone());
            }
        });
        self.on_next(name, handler);

        match timeout {
            None => rx.await.ok(),
            Some(duration) => match tokio::time::timeout(duration, rx).await {
                Ok(received) => received.ok(),
                Err(_) => {
                    warn!("wait_for_next timed out");
                    None
                }
            },
        }
    }

    /// Remove all handlers, persistent and one-shot.
    pub fn clear(&self) {
        self.persistent.write().clear();
        self.once.write().clear();
    }
}

trait CloneEntries {
    fn clone_entries(&self) -> Vec<Entry>;
}

impl CloneEntries for Vec<Entry> {
    fn clone_entries(&self) -> Vec<Entry> {
        self.iter()
            .map(|e| Entry {
                pattern: e.pattern.clone(),
                id: e.id,
                handler: e.handler.clone(),
            })
            .collect()
    }
}
