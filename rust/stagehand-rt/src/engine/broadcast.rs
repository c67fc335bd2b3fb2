//! Broadcast messages and broadcast-and-wait bookkeeping.

use super::{Engine, HatType};
use crate::thread::{Promise, ThreadId};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Index into the engine's broadcast table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BroadcastId(pub usize);

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broadcast:{}", self.0)
    }
}

/// A sender blocked until every receiver of `broadcast` has finished.
#[derive(Debug)]
pub(crate) struct BroadcastWait {
    pub(crate) broadcast: BroadcastId,
    pub(crate) sender: ThreadId,
    promise: Promise,
}

impl Engine {
    /// Register a broadcast name. An identical name returns the existing
    /// entry.
    pub fn add_broadcast(&mut self, name: impl Into<String>) -> BroadcastId {
        let name = name.into();
        if let Some(i) = self.broadcasts.iter().position(|b| *b == name) {
            return BroadcastId(i);
        }
        self.broadcasts.push(name);
        BroadcastId(self.broadcasts.len() - 1)
    }

    /// First broadcast whose name matches, ignoring case.
    pub fn find_broadcast(&self, name: &str) -> Option<BroadcastId> {
        let name = name.to_lowercase();
        self.broadcasts
            .iter()
            .position(|b| b.to_lowercase() == name)
            .map(BroadcastId)
    }

    pub fn broadcasts(&self) -> &[String] {
        &self.broadcasts
    }

    pub fn broadcast_name(&self, id: BroadcastId) -> Option<&str> {
        self.broadcasts.get(id.0).map(String::as_str)
    }

    /// Start (or restart) every receiver of the broadcast.
    pub fn broadcast(&mut self, id: BroadcastId) -> Vec<ThreadId> {
        let Some(name) = self.broadcasts.get(id.0).cloned() else {
            return Vec::new();
        };
        self.broadcast_by_name(&name)
    }

    /// Start every receiver whose message matches `name`, ignoring case.
    pub fn broadcast_by_name(&mut self, name: &str) -> Vec<ThreadId> {
        let started = self.start_hats(HatType::BroadcastReceived, Some(name));
        debug!(broadcast = name, receivers = started.len(), "broadcast");
        started
    }

    /// Broadcast and return a promise that resolves once no receiver of the
    /// message is running. A later wait on the same broadcast resolves the
    /// earlier one.
    pub fn broadcast_and_wait(&mut self, name: &str, sender: ThreadId) -> Promise {
        let id = match self.find_broadcast(name) {
            Some(id) => id,
            None => self.add_broadcast(name),
        };
        self.broadcast_by_name(name);

        let promise = Promise::new();
        if let Some(i) = self.broadcast_waits.iter().position(|w| w.broadcast == id) {
            let earlier = self.broadcast_waits.remove(i);
            if !earlier.promise.is_resolved() {
                earlier.promise.resolve();
            }
        }
        self.broadcast_waits.push(BroadcastWait {
            broadcast: id,
            sender,
            promise: promise.clone(),
        });
        promise
    }

    pub fn pending_broadcast_waits(&self) -> usize {
        self.broadcast_waits.len()
    }

    /// Whether any unfinished thread is a receiver of `name`.
    fn broadcast_running(&self, name: &str) -> bool {
        let is_receiver = |script: super::ScriptId| {
            self.script_hat(script).is_some_and(|b| {
                b.hat == HatType::BroadcastReceived && b.matches_field(name)
            })
        };
        let active = self
            .active
            .as_ref()
            .is_some_and(|a| !a.stopping && is_receiver(a.script));
        active
            || self
                .threads()
                .any(|t| !t.is_finished() && is_receiver(t.script()))
    }

    /// Resolve waits whose receivers have all finished. Each broadcast's
    /// running state is computed once, so every wait on it sees the same
    /// answer.
    pub(crate) fn resolve_broadcast_waits(&mut self) {
        if self.broadcast_waits.is_empty() {
            return;
        }
        let mut running: HashMap<BroadcastId, bool> = HashMap::new();
        for wait in &self.broadcast_waits {
            if running.contains_key(&wait.broadcast) {
                continue;
            }
            let busy = self
                .broadcast_name(wait.broadcast)
                .is_some_and(|name| self.broadcast_running(name));
            running.insert(wait.broadcast, busy);
        }
        self.broadcast_waits.retain(|wait| {
            if running.get(&wait.broadcast).copied().unwrap_or(false) {
                return true;
            }
            if !wait.promise.is_resolved() {
                wait.promise.resolve();
            }
            false
        });
    }
}
