//! In-memory `StateStore` used by tests and local development. Mirrors the
//! Redis implementation's semantics exactly (same TTLs, same windowing) so
//! scenario tests can assert point-in-time correctness deterministically.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::event::TxHistoryEntry;

use super::{MerchantFeatures, StateStore};

#[derive(Default)]
struct Inner {
    history: HashMap<String, Vec<TxHistoryEntry>>,
    merchants_24h: HashMap<String, HashSet<String>>,
    avg_amount: HashMap<String, f64>,
    last_tx_timestamp: HashMap<String, i64>,
    merchant_features: HashMap<String, MerchantFeatures>,
    /// Last TTL value passed to a write against each key — lets tests
    /// assert invariant 4 ("every write carries a TTL") without a real
    /// clock.
    ttls: HashMap<String, i64>,
}

pub struct MemoryStateStore {
    inner: Mutex<Inner>,
    tx_history_ttl: i64,
    merchant_set_ttl: i64,
    card_stats_ttl: i64,
    healthy: Mutex<bool>,
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new(86_400, 86_400, 2_592_000)
    }
}

impl MemoryStateStore {
    pub fn new(tx_history_ttl: i64, merchant_set_ttl: i64, card_stats_ttl: i64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            tx_history_ttl,
            merchant_set_ttl,
            card_stats_ttl,
            healthy: Mutex::new(true),
        }
    }

    /// Preload merchant features, as the out-of-band external writer would.
    pub fn seed_merchant_features(&self, merchant_id: &str, features: MerchantFeatures) {
        self.inner
            .lock()
            .merchant_features
            .insert(merchant_id.to_string(), features);
    }

    /// Simulate a store outage: reads return defaults, writes return false.
    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock() = healthy;
    }

    /// TTL most recently set on `key`, if any write has touched it.
    pub fn ttl_of(&self, key: &str) -> Option<i64> {
        self.inner.lock().ttls.get(key).copied()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn append_history(&self, card_id: &str, entry: &TxHistoryEntry) -> bool {
        if !*self.healthy.lock() {
            return false;
        }
        let mut inner = self.inner.lock();
        let history = inner.history.entry(card_id.to_string()).or_default();
        history.push(entry.clone());
        let cutoff = entry.timestamp - self.tx_history_ttl;
        history.retain(|e| e.timestamp >= cutoff);
        inner
            .ttls
            .insert(super::tx_history_key(card_id), self.tx_history_ttl);
        true
    }

    async fn range_history(&self, card_id: &str, window_secs: i64, now: i64) -> Vec<TxHistoryEntry> {
        if !*self.healthy.lock() {
            return Vec::new();
        }
        let inner = self.inner.lock();
        let lower = now - window_secs;
        inner
            .history
            .get(card_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.timestamp >= lower && e.timestamp <= now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn add_merchant(&self, card_id: &str, merchant_id: &str) -> bool {
        if !*self.healthy.lock() {
            return false;
        }
        let mut inner = self.inner.lock();
        inner
            .merchants_24h
            .entry(card_id.to_string())
            .or_default()
            .insert(merchant_id.to_string());
        inner
            .ttls
            .insert(super::merchants_24h_key(card_id), self.merchant_set_ttl);
        true
    }

    async fn count_merchants(&self, card_id: &str) -> i64 {
        if !*self.healthy.lock() {
            return 0;
        }
        let inner = self.inner.lock();
        inner
            .merchants_24h
            .get(card_id)
            .map(|s| s.len() as i64)
            .unwrap_or(0)
    }

    async fn bump_ema(&self, card_id: &str, amount: f64, alpha: f64) -> f64 {
        if !*self.healthy.lock() {
            return 75.0;
        }
        let mut inner = self.inner.lock();
        let old = inner.avg_amount.get(card_id).copied().unwrap_or(75.0);
        let new_avg = alpha * amount + (1.0 - alpha) * old;
        inner.avg_amount.insert(card_id.to_string(), new_avg);
        inner
            .ttls
            .insert(super::card_stats_key(card_id), self.card_stats_ttl);
        new_avg
    }

    async fn get_ema(&self, card_id: &str) -> Option<f64> {
        if !*self.healthy.lock() {
            return None;
        }
        self.inner.lock().avg_amount.get(card_id).copied()
    }

    async fn set_last_ts(&self, card_id: &str, ts: i64) -> bool {
        if !*self.healthy.lock() {
            return false;
        }
        let mut inner = self.inner.lock();
        inner.last_tx_timestamp.insert(card_id.to_string(), ts);
        inner
            .ttls
            .insert(super::card_stats_key(card_id), self.card_stats_ttl);
        true
    }

    async fn get_last_ts(&self, card_id: &str) -> Option<i64> {
        if !*self.healthy.lock() {
            return None;
        }
        self.inner.lock().last_tx_timestamp.get(card_id).copied()
    }

    async fn get_merchant_features(&self, merchant_id: &str) -> MerchantFeatures {
        if !*self.healthy.lock() {
            return MerchantFeatures::default();
        }
        self.inner
            .lock()
            .merchant_features
            .get(merchant_id)
            .copied()
            .unwrap_or_default()
    }

    async fn health_check(&self) -> bool {
        *self.healthy.lock()
    }
}
