//! Redis-backed `StateStore`. Talks to a small round-robin pool of
//! `redis::aio::ConnectionManager`s (each already reconnects and pipelines
//! internally on its own), wraps every round trip in a socket timeout, and
//! degrades to the documented defaults on failure rather than bubbling an
//! error up into the consumer loop.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time::timeout;
use tracing::warn;

use crate::config::Config;
use crate::error::StoreError;
use crate::event::TxHistoryEntry;

use super::{
    card_stats_key, merchant_features_key, merchants_24h_key, tx_history_key, MerchantFeatures,
    StateStore,
};

pub struct RedisStateStore {
    pool: Vec<ConnectionManager>,
    next: AtomicUsize,
    socket_timeout: std::time::Duration,
    tx_history_ttl: i64,
    merchant_set_ttl: i64,
    card_stats_ttl: i64,
    default_avg_amount: f64,
}

impl RedisStateStore {
    pub async fn connect(config: &Config) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(config.redis_url())?;
        let pool_size = config.redis_pool_size.max(1);
        let mut pool = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            pool.push(client.get_connection_manager().await?);
        }
        Ok(Self {
            pool,
            next: AtomicUsize::new(0),
            socket_timeout: config.redis_socket_timeout,
            tx_history_ttl: config.tx_history_ttl_secs,
            merchant_set_ttl: config.merchant_set_ttl_secs,
            card_stats_ttl: config.card_stats_ttl_secs,
            default_avg_amount: config.default_avg_amount,
        })
    }

    /// Next connection in the pool, round-robin. `ConnectionManager` clones
    /// are cheap (it's a handle to a shared multiplexed connection task),
    /// so each caller gets its own handle into one of the pool's slots.
    fn conn(&self) -> ConnectionManager {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        self.pool[idx].clone()
    }

    async fn call<F, Fut, T>(&self, op: &'static str, fut: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.socket_timeout, fut()).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                let err = StoreError::from(err);
                warn!(operation = op, error = %err, "redis operation failed");
                None
            }
            Err(_) => {
                let err = StoreError::Timeout(self.socket_timeout);
                warn!(operation = op, error = %err, "redis operation timed out");
                None
            }
        }
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn append_history(&self, card_id: &str, entry: &TxHistoryEntry) -> bool {
        let key = tx_history_key(card_id);
        let ttl = self.tx_history_ttl;
        let member = match serde_json::to_string(entry) {
            Ok(m) => m,
            Err(_) => return false,
        };
        let score = entry.timestamp;
        let cutoff = entry.timestamp - ttl;
        let conn = self.conn();

        let result: Option<()> = self
            .call("append_history", move || {
                let mut conn = conn.clone();
                async move {
                    let mut pipe = redis::pipe();
                    pipe.atomic()
                        .zadd(&key, member, score)
                        .zrembyscore(&key, i64::MIN, cutoff)
                        .expire(&key, ttl)
                        .ignore();
                    pipe.query_async(&mut conn).await
                }
            })
            .await;
        result.is_some()
    }

    async fn range_history(&self, card_id: &str, window_secs: i64, now: i64) -> Vec<TxHistoryEntry> {
        let key = tx_history_key(card_id);
        let lower = now - window_secs;
        let conn = self.conn();

        let raw: Option<Vec<String>> = self
            .call("range_history", move || {
                let mut conn = conn.clone();
                async move { conn.zrangebyscore(&key, lower, now).await }
            })
            .await;

        raw.unwrap_or_default()
            .into_iter()
            .filter_map(|s| serde_json::from_str(&s).ok())
            .collect()
    }

    async fn add_merchant(&self, card_id: &str, merchant_id: &str) -> bool {
        let key = merchants_24h_key(card_id);
        let ttl = self.merchant_set_ttl;
        let merchant_id = merchant_id.to_string();
        let conn = self.conn();

        let result: Option<()> = self
            .call("add_merchant", move || {
                let mut conn = conn.clone();
                async move {
                    let mut pipe = redis::pipe();
                    pipe.atomic()
                        .sadd(&key, merchant_id)
                        .expire(&key, ttl)
                        .ignore();
                    pipe.query_async(&mut conn).await
                }
            })
            .await;
        result.is_some()
    }

    async fn count_merchants(&self, card_id: &str) -> i64 {
        let key = merchants_24h_key(card_id);
        let conn = self.conn();
        self.call("count_merchants", move || {
            let mut conn = conn.clone();
            async move { conn.scard(&key).await }
        })
        .await
        .unwrap_or(0)
    }

    async fn bump_ema(&self, card_id: &str, amount: f64, alpha: f64) -> f64 {
        let key = card_stats_key(card_id);
        let ttl = self.card_stats_ttl;
        let seed = self.default_avg_amount;
        let conn = self.conn();

        let new_avg: Option<f64> = self
            .call("bump_ema", move || {
                let mut conn = conn.clone();
                async move {
                    let old: Option<f64> = conn.hget(&key, "avg_amount").await?;
                    let old = old.unwrap_or(seed);
                    let new_avg = alpha * amount + (1.0 - alpha) * old;
                    let mut pipe = redis::pipe();
                    pipe.atomic()
                        .hset(&key, "avg_amount", new_avg)
                        .expire(&key, ttl)
                        .ignore();
                    pipe.query_async::<()>(&mut conn).await?;
                    Ok(new_avg)
                }
            })
            .await;
        new_avg.unwrap_or(seed)
    }

    async fn get_ema(&self, card_id: &str) -> Option<f64> {
        let key = card_stats_key(card_id);
        let conn = self.conn();
        self.call("get_ema", move || {
            let mut conn = conn.clone();
            async move { conn.hget(&key, "avg_amount").await }
        })
        .await
        .flatten()
    }

    async fn set_last_ts(&self, card_id: &str, ts: i64) -> bool {
        let key = card_stats_key(card_id);
        let ttl = self.card_stats_ttl;
        let conn = self.conn();

        let result: Option<()> = self
            .call("set_last_ts", move || {
                let mut conn = conn.clone();
                async move {
                    let mut pipe = redis::pipe();
                    pipe.atomic()
                        .hset(&key, "last_tx_timestamp", ts)
                        .expire(&key, ttl)
                        .ignore();
                    pipe.query_async(&mut conn).await
                }
            })
            .await;
        result.is_some()
    }

    async fn get_last_ts(&self, card_id: &str) -> Option<i64> {
        let key = card_stats_key(card_id);
        let conn = self.conn();
        self.call("get_last_ts", move || {
            let mut conn = conn.clone();
            async move { conn.hget(&key, "last_tx_timestamp").await }
        })
        .await
        .flatten()
    }

    async fn get_merchant_features(&self, merchant_id: &str) -> MerchantFeatures {
        let key = merchant_features_key(merchant_id);
        let conn = self.conn();

        let fields: Option<(Option<f64>, Option<f64>, Option<i64>)> = self
            .call("get_merchant_features", move || {
                let mut conn = conn.clone();
                async move {
                    let risk_score: Option<f64> = conn.hget(&key, "risk_score").await?;
                    let fraud_rate: Option<f64> = conn.hget(&key, "fraud_rate").await?;
                    let total_transactions: Option<i64> = conn.hget(&key, "total_transactions").await?;
                    Ok((risk_score, fraud_rate, total_transactions))
                }
            })
            .await;

        let defaults = MerchantFeatures::default();
        match fields {
            Some((risk_score, fraud_rate, total_transactions)) => MerchantFeatures {
                risk_score: risk_score.unwrap_or(defaults.risk_score),
                fraud_rate: fraud_rate.unwrap_or(defaults.fraud_rate),
                total_transactions: total_transactions.unwrap_or(defaults.total_transactions),
            },
            None => defaults,
        }
    }

    async fn health_check(&self) -> bool {
        let conn = self.conn();
        self.call("health_check", move || {
            let mut conn = conn.clone();
            async move { redis::cmd("PING").query_async::<String>(&mut conn).await }
        })
        .await
        .is_some()
    }
}
