//! Event schema: the as-received raw record and the validated, immutable
//! `Event` the rest of the engine operates on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// As-received transaction record. Deliberately loose: the wire format is
/// JSON of unknown shape until `preprocessor::preprocess` validates it.
pub type RawEvent = Value;

/// A validated, immutable transaction. Produced only by
/// `preprocessor::preprocess`; every field has already been range-checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub transaction_id: String,
    pub card_id: String,
    pub amount: f64,
    pub merchant_id: String,
    pub timestamp: i64,
    pub merchant_category: String,
    pub location_lat: Option<f64>,
    pub location_lon: Option<f64>,
    pub city: String,
    pub state: String,
    pub user_id: String,
}

/// A single entry in a card's rolling transaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxHistoryEntry {
    pub amount: f64,
    pub merchant_id: String,
    pub timestamp: i64,
}

impl TxHistoryEntry {
    pub fn from_event(event: &Event) -> Self {
        Self {
            amount: event.amount,
            merchant_id: event.merchant_id.clone(),
            timestamp: event.timestamp,
        }
    }
}
