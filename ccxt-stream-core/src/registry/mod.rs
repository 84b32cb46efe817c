//! Message-hash future registry.
//!
//! Maps an opaque message hash to the waiters suspended on it. One hash may
//! carry any number of one-shot waiters plus one persistent channel shared by
//! every persistent subscriber of that hash. Persistent delivery is
//! latest-value: a subscriber that falls behind observes the most recent
//! resolution, not a backlog.

mod waiter;

pub use waiter::{Waiter, WaiterKind};

use dashmap::DashMap;
use tokio::sync::{oneshot, watch};
use tracing::trace;
use waiter::Slot;

use crate::error::{Error, Result};

#[derive(Debug)]
struct Entry<V> {
    persistent: Option<watch::Sender<Slot<V>>>,
    one_shot: Vec<oneshot::Sender<Result<V>>>,
}

impl<V> Default for Entry<V> {
    fn default() -> Self {
        Self {
            persistent: None,
            one_shot: Vec::new(),
        }
    }
}

impl<V: Clone> Entry<V> {
    fn is_idle(&self) -> bool {
        self.persistent.is_none() && self.one_shot.is_empty()
    }

    fn deliver(&mut self, result: &Result<V>) -> usize {
        let mut delivered = 0;
        for tx in self.one_shot.drain(..) {
            if tx.send(result.clone()).is_ok() {
                delivered += 1;
            }
        }
        if let Some(tx) = &self.persistent {
            delivered += tx.receiver_count();
            tx.send_replace(Some(result.clone()));
        }
        delivered
    }
}

/// Registry of waiters keyed by message hash.
#[derive(Debug)]
pub struct FutureRegistry<V> {
    entries: DashMap<String, Entry<V>>,
}

impl<V> Default for FutureRegistry<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> FutureRegistry<V> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter on `message_hash`.
    ///
    /// Registering a persistent waiter on a hash that already has one joins
    /// the existing channel, so re-subscribing is idempotent.
    pub fn register(&self, message_hash: &str, kind: WaiterKind) -> Waiter<V> {
        let mut entry = self.entries.entry(message_hash.to_string()).or_default();
        match kind {
            WaiterKind::OneShot => {
                let (tx, rx) = oneshot::channel();
                entry.one_shot.push(tx);
                Waiter::one_shot(message_hash.to_string(), rx)
            }
            WaiterKind::Persistent => {
                let rx = match &entry.persistent {
                    Some(tx) => tx.subscribe(),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        entry.persistent = Some(tx);
                        rx
                    }
                };
                Waiter::persistent(message_hash.to_string(), rx)
            }
        }
    }

    /// Delivers `value` to every waiter on `message_hash`.
    ///
    /// One-shot waiters are removed, persistent ones stay registered. Returns
    /// the number of waiters reached.
    pub fn resolve(&self, message_hash: &str, value: V) -> usize {
        self.settle(message_hash, &Ok(value))
    }

    /// Delivers `error` to every waiter on `message_hash`.
    ///
    /// Each current waiter observes the rejection once; persistent waiters
    /// remain registered and receive later resolutions as usual.
    pub fn reject(&self, message_hash: &str, error: Error) -> usize {
        self.settle(message_hash, &Err(error))
    }

    fn settle(&self, message_hash: &str, result: &Result<V>) -> usize {
        let delivered = match self.entries.get_mut(message_hash) {
            Some(mut entry) => entry.deliver(result),
            None => return 0,
        };
        self.entries.remove_if(message_hash, |_, entry| entry.is_idle());
        trace!(message_hash, delivered, ok = result.is_ok(), "settled message hash");
        delivered
    }

    /// Rejects every registered hash and drops all entries.
    ///
    /// Used on connection teardown: persistent subscribers see `error` and
    /// then the end of their channel.
    pub fn reject_all(&self, error: &Error) -> usize {
        let hashes = self.hashes();
        let mut delivered = 0;
        for hash in hashes {
            if let Some((_, mut entry)) = self.entries.remove(&hash) {
                delivered += entry.deliver(&Err(error.clone()));
            }
        }
        delivered
    }

    /// Drops the persistent channel of `message_hash`.
    ///
    /// Pending one-shot waiters on the same hash are kept.
    pub fn unsubscribe(&self, message_hash: &str) -> bool {
        let removed = self
            .entries
            .get_mut(message_hash)
            .and_then(|mut entry| entry.persistent.take())
            .is_some();
        self.entries.remove_if(message_hash, |_, entry| entry.is_idle());
        removed
    }

    /// Returns `true` if any waiter is registered on `message_hash`.
    pub fn contains(&self, message_hash: &str) -> bool {
        self.entries.contains_key(message_hash)
    }

    /// Returns `true` if `message_hash` has a persistent channel.
    pub fn is_persistent(&self, message_hash: &str) -> bool {
        self.entries
            .get(message_hash)
            .is_some_and(|entry| entry.persistent.is_some())
    }

    /// Number of pending one-shot waiters on `message_hash`.
    pub fn pending_one_shot(&self, message_hash: &str) -> usize {
        self.entries
            .get(message_hash)
            .map_or(0, |entry| entry.one_shot.len())
    }

    /// Registered message hashes.
    pub fn hashes(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered message hashes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
