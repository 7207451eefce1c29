//! Windowed aggregation (C3): stateless helpers over `StateStore` that
//! enforce point-in-time correctness. Every read is bounded by the event's
//! own timestamp, never wall-clock `now` — a late-arriving event must never
//! see state written by a later one.

use crate::event::TxHistoryEntry;
use crate::store::StateStore;

pub struct WindowManager<'a> {
    store: &'a dyn StateStore,
}

impl<'a> WindowManager<'a> {
    pub fn new(store: &'a dyn StateStore) -> Self {
        Self { store }
    }

    /// Transactions in the trailing `window_secs` ending at `as_of`,
    /// inclusive of `as_of` itself.
    pub async fn history_in_window(&self, card_id: &str, window_secs: i64, as_of: i64) -> Vec<TxHistoryEntry> {
        self.store.range_history(card_id, window_secs, as_of).await
    }

    pub async fn count_in_window(&self, card_id: &str, window_secs: i64, as_of: i64) -> i64 {
        self.history_in_window(card_id, window_secs, as_of)
            .await
            .len() as i64
    }

    pub async fn sum_in_window(&self, card_id: &str, window_secs: i64, as_of: i64) -> f64 {
        self.history_in_window(card_id, window_secs, as_of)
            .await
            .iter()
            .map(|e| e.amount)
            .sum()
    }

    pub async fn unique_merchants_24h(&self, card_id: &str) -> i64 {
        self.store.count_merchants(card_id).await
    }

    /// `new = alpha * amount + (1 - alpha) * old`, seeded at the store's
    /// default when the card has no prior average.
    pub async fn rolling_average(&self, card_id: &str, amount: f64, alpha: f64) -> f64 {
        self.store.bump_ema(card_id, amount, alpha).await
    }

    pub async fn seconds_since_last_transaction(&self, card_id: &str, as_of: i64) -> Option<i64> {
        self.store
            .get_last_ts(card_id)
            .await
            .map(|last| (as_of - last).max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;

    #[tokio::test]
    async fn window_excludes_events_after_as_of() {
        let store = MemoryStateStore::default();
        for (amount, ts) in [(10.0, 100), (20.0, 200), (30.0, 900)] {
            store
                .append_history(
                    "c1",
                    &TxHistoryEntry {
                        amount,
                        merchant_id: "m".to_string(),
                        timestamp: ts,
                    },
                )
                .await;
        }
        let window = WindowManager::new(&store);
        // as_of=250 must never see the ts=900 entry, even though it's
        // already in the store (it arrived out of order).
        let sum = window.sum_in_window("c1", 1_000, 250).await;
        assert_eq!(sum, 30.0);
    }

    #[tokio::test]
    async fn rolling_average_seeds_at_default() {
        let store = MemoryStateStore::default();
        let window = WindowManager::new(&store);
        let avg = window.rolling_average("c1", 100.0, 0.1).await;
        assert_eq!(avg, 0.1 * 100.0 + 0.9 * 75.0);
    }

    #[tokio::test]
    async fn seconds_since_last_is_none_on_cold_start() {
        let store = MemoryStateStore::default();
        let window = WindowManager::new(&store);
        assert_eq!(window.seconds_since_last_transaction("c1", 1_000).await, None);
    }
}
