//! State store client (C2): a typed façade over the key-value store.
//!
//! `StateStore` is the trait the rest of the engine programs against —
//! named exactly after the operations in SPEC_FULL.md §4.2 — so tests can
//! run the whole pipeline against `MemoryStateStore` without a live Redis.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;

use crate::event::TxHistoryEntry;

pub use memory::MemoryStateStore;
pub use redis_store::RedisStateStore;

/// Default merchant feature values, used when `features:merchant:*` has
/// never been populated (cold start, or the external writer hasn't run).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MerchantFeatures {
    pub risk_score: f64,
    pub fraud_rate: f64,
    pub total_transactions: i64,
}

impl Default for MerchantFeatures {
    fn default() -> Self {
        Self {
            risk_score: 0.5,
            fraud_rate: 0.002,
            total_transactions: 100,
        }
    }
}

pub fn card_stats_key(card_id: &str) -> String {
    format!("card:{card_id}:stats")
}

pub fn tx_history_key(card_id: &str) -> String {
    format!("card:{card_id}:tx_history")
}

pub fn merchants_24h_key(card_id: &str) -> String {
    format!("card:{card_id}:merchants:24h")
}

pub fn merchant_features_key(merchant_id: &str) -> String {
    format!("features:merchant:{merchant_id}")
}

/// Typed façade over the key-value store. Every write carries a TTL; every
/// read degrades to a documented default on failure rather than propagating
/// an error — a transient store outage is a feature-quality degradation,
/// not a correctness-breaking event (SPEC_FULL.md §4.2).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Append an entry to the card's transaction history (score = timestamp),
    /// trim entries older than 24h, and reset the key's TTL. Returns `false`
    /// on any I/O failure.
    async fn append_history(&self, card_id: &str, entry: &TxHistoryEntry) -> bool;

    /// Entries with `timestamp` in `[now - window_secs, now]`, inclusive.
    /// Returns an empty vec on any I/O failure.
    async fn range_history(&self, card_id: &str, window_secs: i64, now: i64) -> Vec<TxHistoryEntry>;

    /// Add `merchant_id` to the card's 24h unique-merchant set; reset TTL.
    async fn add_merchant(&self, card_id: &str, merchant_id: &str) -> bool;

    /// Cardinality of the card's 24h unique-merchant set.
    async fn count_merchants(&self, card_id: &str) -> i64;

    /// Read-modify-write the EMA: `new = alpha * amount + (1 - alpha) * old`,
    /// seeded at 75.0 if absent. Returns the updated average, or the seed
    /// value on I/O failure.
    async fn bump_ema(&self, card_id: &str, amount: f64, alpha: f64) -> f64;

    /// Current EMA, or `None` if the card has no prior average.
    async fn get_ema(&self, card_id: &str) -> Option<f64>;

    async fn set_last_ts(&self, card_id: &str, ts: i64) -> bool;

    async fn get_last_ts(&self, card_id: &str) -> Option<i64>;

    /// Merchant risk features, defaulted if the key has never been written
    /// (this core never writes `features:merchant:*` itself).
    async fn get_merchant_features(&self, merchant_id: &str) -> MerchantFeatures;

    async fn health_check(&self) -> bool;
}
