//! Feature extractor (C4): composes preprocessed events and windowed state
//! reads into the fixed feature vector, and performs the post-extraction
//! state update. The two are separate operations — `extract` never writes,
//! so an event can never see its own effect (no feature leakage).

use chrono::{Datelike, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::event::{Event, TxHistoryEntry};
use crate::store::StateStore;
use crate::window::WindowManager;

/// The frozen feature schema (SPEC_FULL.md §4.4). Field order matches the
/// spec's listing; `merchant_category` and the identifiers travel alongside
/// so a downstream consumer need not rejoin against the event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub transaction_id: String,
    pub card_id: String,

    pub amount: f64,
    pub amount_log: f64,
    pub merchant_category: String,
    pub has_location: u8,

    pub tx_count_10m: i64,
    pub tx_count_1h: i64,
    pub tx_count_24h: i64,
    pub total_amount_10m: f64,
    pub total_amount_1h: f64,
    pub total_amount_24h: f64,
    pub unique_merchants_24h: i64,
    pub time_since_last_tx: i64,

    pub avg_tx_amount_30d: f64,
    pub amount_deviation: f64,
    pub amount_vs_avg_ratio: f64,

    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub is_weekend: u8,
    pub is_night: u8,

    pub merchant_risk_score: f64,
    pub merchant_fraud_rate: f64,
    pub merchant_total_transactions: i64,
}

pub struct FeatureExtractor {
    alpha: f64,
    default_avg_amount: f64,
    windows: Vec<(&'static str, i64)>,
}

impl FeatureExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            alpha: config.rolling_avg_alpha,
            default_avg_amount: config.default_avg_amount,
            windows: vec![
                ("10m", *config.velocity_windows.get("10m").unwrap_or(&600)),
                ("1h", *config.velocity_windows.get("1h").unwrap_or(&3_600)),
                ("24h", *config.velocity_windows.get("24h").unwrap_or(&86_400)),
            ],
        }
    }

    /// Compute the feature vector for `event`. Pure with respect to store
    /// state: calling this twice without an intervening `update_state`
    /// yields identical output.
    pub async fn extract(&self, event: &Event, store: &dyn StateStore) -> FeatureVector {
        let window = WindowManager::new(store);

        let mut counts = [0i64; 3];
        let mut sums = [0f64; 3];
        for (i, (_, secs)) in self.windows.iter().enumerate() {
            let history = window.history_in_window(&event.card_id, *secs, event.timestamp).await;
            counts[i] = history.len() as i64;
            sums[i] = round2(history.iter().map(|e| e.amount).sum());
        }

        let unique_merchants_24h = window.unique_merchants_24h(&event.card_id).await;

        let last_ts = store.get_last_ts(&event.card_id).await;
        let time_since_last_tx = match last_ts {
            Some(last) if event.timestamp - last > 0 => event.timestamp - last,
            _ => 0,
        };

        let avg = store.get_ema(&event.card_id).await.unwrap_or(self.default_avg_amount);
        let avg_tx_amount_30d = round2(avg);
        let (amount_deviation, amount_vs_avg_ratio) = if avg > 0.0 {
            (
                round3((event.amount - avg) / avg),
                round3(event.amount / avg),
            )
        } else {
            (0.0, 1.0)
        };

        let dt = Utc.timestamp_opt(event.timestamp, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
        let hour_of_day = dt.hour();
        let day_of_week = dt.weekday().num_days_from_monday();
        let is_weekend = (day_of_week >= 5) as u8;
        let is_night = (hour_of_day >= 22 || hour_of_day < 6) as u8;

        let merchant = store.get_merchant_features(&event.merchant_id).await;

        FeatureVector {
            transaction_id: event.transaction_id.clone(),
            card_id: event.card_id.clone(),

            amount: event.amount,
            amount_log: (event.amount.max(0.0) + 1.0).ln(),
            merchant_category: event.merchant_category.clone(),
            has_location: event.location_lat.is_some() as u8,

            tx_count_10m: counts[0],
            tx_count_1h: counts[1],
            tx_count_24h: counts[2],
            total_amount_10m: sums[0],
            total_amount_1h: sums[1],
            total_amount_24h: sums[2],
            unique_merchants_24h,
            time_since_last_tx,

            avg_tx_amount_30d,
            amount_deviation,
            amount_vs_avg_ratio,

            hour_of_day,
            day_of_week,
            is_weekend,
            is_night,

            merchant_risk_score: merchant.risk_score,
            merchant_fraud_rate: merchant.fraud_rate,
            merchant_total_transactions: merchant.total_transactions,
        }
    }

    /// Apply `event`'s four independent writes, in the fixed order the spec
    /// requires. Must run only after `extract` has already read state.
    pub async fn update_state(&self, event: &Event, store: &dyn StateStore) {
        let entry = TxHistoryEntry::from_event(event);
        store.append_history(&event.card_id, &entry).await;
        store.add_merchant(&event.card_id, &event.merchant_id).await;
        store.bump_ema(&event.card_id, event.amount, self.alpha).await;
        store.set_last_ts(&event.card_id, event.timestamp).await;
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1_000.0).round() / 1_000.0
}
