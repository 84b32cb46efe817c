//! Recorded subscribe requests.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// A subscribe frame recorded for replay after reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    /// Message hash the frame was first sent for
    pub message_hash: String,
    /// Every message hash answered by this subscription, in join order
    pub hashes: Vec<String>,
    /// Frame sent to the exchange
    pub request: Value,
    /// Key the exchange uses to deduplicate subscriptions, if different from the hash
    pub subscription_key: Option<String>,
    /// Whether the channel needs authentication
    pub private: bool,
    /// Registration order on the owning connection
    pub seq: u64,
}

impl SubscriptionRecord {
    /// Returns `true` if `message_hash` is answered by this subscription.
    pub fn answers(&self, message_hash: &str) -> bool {
        self.hashes.iter().any(|h| h == message_hash)
    }
}

/// Subscription records of one connection, with a capacity limit.
#[derive(Debug)]
pub struct SubscriptionManager {
    records: DashMap<String, SubscriptionRecord>,
    next_seq: AtomicU64,
    max_subscriptions: usize,
}

impl SubscriptionManager {
    /// Creates an empty manager holding at most `max_subscriptions` records.
    pub fn new(max_subscriptions: usize) -> Self {
        Self {
            records: DashMap::new(),
            next_seq: AtomicU64::new(0),
            max_subscriptions,
        }
    }

    /// Records a subscribe request under its dedup key.
    ///
    /// Returns `Ok(true)` when the key is new and the frame must be sent,
    /// `Ok(false)` when a subscription with that key already exists. In the
    /// latter case `message_hash` joins the existing record.
    pub fn try_add(
        &self,
        message_hash: &str,
        request: Value,
        subscription_key: Option<String>,
        private: bool,
    ) -> Result<bool> {
        let key = subscription_key.clone().unwrap_or_else(|| message_hash.to_string());
        if let Some(mut existing) = self.records.get_mut(&key) {
            if !existing.hashes.iter().any(|h| h == message_hash) {
                existing.hashes.push(message_hash.to_string());
            }
            return Ok(false);
        }
        if self.records.len() >= self.max_subscriptions {
            return Err(Error::resource_exhausted(format!(
                "Maximum subscriptions ({}) reached",
                self.max_subscriptions
            )));
        }
        let record = SubscriptionRecord {
            message_hash: message_hash.to_string(),
            hashes: vec![message_hash.to_string()],
            request,
            subscription_key,
            private,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        Ok(self.records.insert(key, record).is_none())
    }

    /// Re-inserts records carried over from a previous connection, keeping
    /// their relative order.
    pub fn restore(&self, records: Vec<SubscriptionRecord>) {
        for mut record in records {
            record.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let key = record
                .subscription_key
                .clone()
                .unwrap_or_else(|| record.message_hash.clone());
            self.records.insert(key, record);
        }
    }

    /// Detaches `message_hash` from every record answering on it.
    ///
    /// Returns the records left with no hash, which are dropped and need an
    /// unsubscribe frame. Records still shared with other hashes are kept.
    pub fn remove_hash(&self, message_hash: &str) -> Vec<SubscriptionRecord> {
        let keys: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.value().answers(message_hash))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = Vec::new();
        for key in keys {
            let emptied = self.records.get_mut(&key).is_some_and(|mut record| {
                record.hashes.retain(|h| h != message_hash);
                let next = record.hashes.first().cloned();
                if let Some(next) = next
                    && record.message_hash == message_hash
                {
                    record.message_hash = next;
                }
                record.hashes.is_empty()
            });
            if emptied && let Some((_, record)) = self.records.remove(&key) {
                removed.push(record);
            }
        }
        removed
    }

    /// Records in registration order.
    pub fn ordered(&self) -> Vec<SubscriptionRecord> {
        let mut records: Vec<_> = self.records.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|record| record.seq);
        records
    }

    /// Message hashes of private channels.
    pub fn private_hashes(&self) -> Vec<String> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.value().private)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.seq);
        records.into_iter().flat_map(|record| record.hashes).collect()
    }

    /// Returns `true` if a record answers on `message_hash`.
    pub fn contains_hash(&self, message_hash: &str) -> bool {
        self.records
            .iter()
            .any(|entry| entry.value().answers(message_hash))
    }

    /// Returns `true` if `message_hash` belongs to a private channel.
    pub fn is_private(&self, message_hash: &str) -> bool {
        self.records
            .iter()
            .any(|entry| entry.value().private && entry.value().answers(message_hash))
    }

    /// Number of records.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Remaining capacity for new records.
    #[inline]
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        self.max_subscriptions.saturating_sub(self.records.len())
    }

    /// Drops every record.
    pub fn clear(&self) {
        self.records.clear();
    }
}
