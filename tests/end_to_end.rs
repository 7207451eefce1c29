//! End-to-end scenarios against an in-memory state store: preprocess →
//! extract → update_state, run the way the consumer loop runs them.

use fraud_feature_engine::config::Config;
use fraud_feature_engine::features::FeatureExtractor;
use fraud_feature_engine::preprocessor::Preprocessor;
use fraud_feature_engine::store::MemoryStateStore;
use serde_json::json;

fn harness() -> (Preprocessor, FeatureExtractor, MemoryStateStore) {
    let config = Config::from_env();
    (
        Preprocessor::new(&config),
        FeatureExtractor::new(&config),
        MemoryStateStore::default(),
    )
}

#[tokio::test]
async fn cold_start_then_second_event_within_ten_minutes() {
    let (pre, extractor, store) = harness();

    let first = pre
        .preprocess(&json!({
            "transaction_id": "A",
            "card_id": "C1",
            "amount": 100.00,
            "merchant_id": "M1",
            "timestamp": 1_707_580_000,
        }))
        .unwrap();
    let first_feats = extractor.extract(&first, &store).await;
    assert_eq!(first_feats.tx_count_10m, 0);
    assert_eq!(first_feats.time_since_last_tx, 0);
    assert_eq!(first_feats.avg_tx_amount_30d, 75.00);
    assert_eq!(first_feats.hour_of_day, 12);
    assert_eq!(first_feats.day_of_week, 5);
    assert_eq!(first_feats.is_weekend, 1);
    assert_eq!(first_feats.is_night, 0);
    extractor.update_state(&first, &store).await;
    assert_eq!(store.get_ema("C1").await, Some(77.5));

    let second = pre
        .preprocess(&json!({
            "transaction_id": "B",
            "card_id": "C1",
            "amount": 50,
            "merchant_id": "M2",
            "timestamp": 1_707_580_300,
        }))
        .unwrap();
    let second_feats = extractor.extract(&second, &store).await;
    assert_eq!(second_feats.tx_count_10m, 1);
    assert_eq!(second_feats.tx_count_1h, 1);
    assert_eq!(second_feats.tx_count_24h, 1);
    assert_eq!(second_feats.time_since_last_tx, 300);
    assert_eq!(second_feats.avg_tx_amount_30d, 77.50);
}

#[tokio::test]
async fn out_of_window_event_still_counted_in_wider_buckets() {
    let (pre, extractor, store) = harness();
    let first = pre
        .preprocess(&json!({
            "transaction_id": "A",
            "card_id": "C1",
            "amount": 100.00,
            "merchant_id": "M1",
            "timestamp": 1_707_580_000,
        }))
        .unwrap();
    extractor.extract(&first, &store).await;
    extractor.update_state(&first, &store).await;

    let second = pre
        .preprocess(&json!({
            "transaction_id": "B",
            "card_id": "C1",
            "amount": 10,
            "merchant_id": "M1",
            "timestamp": 1_707_580_000 + 700,
        }))
        .unwrap();
    let feats = extractor.extract(&second, &store).await;
    assert_eq!(feats.tx_count_10m, 0);
    assert_eq!(feats.tx_count_1h, 1);
    assert_eq!(feats.tx_count_24h, 1);
}

#[tokio::test]
async fn missing_required_field_is_a_schema_error() {
    let (pre, _extractor, _store) = harness();
    let err = pre
        .preprocess(&json!({
            "transaction_id": "x",
            "amount": 1,
            "merchant_id": "m",
            "timestamp": 1_707_580_000,
        }))
        .unwrap_err();
    assert!(matches!(err, fraud_feature_engine::error::PreprocessError::Schema(_)));
}

#[tokio::test]
async fn timestamp_below_epoch_floor_is_a_range_error() {
    let (pre, _extractor, _store) = harness();
    let err = pre
        .preprocess(&json!({
            "transaction_id": "x",
            "card_id": "c",
            "amount": 1,
            "merchant_id": "m",
            "timestamp": 946_684_799,
        }))
        .unwrap_err();
    assert!(matches!(err, fraud_feature_engine::error::PreprocessError::Range(_)));
}

#[tokio::test]
async fn unicode_and_emoji_survive_the_full_pipeline() {
    let (pre, extractor, store) = harness();
    let event = pre
        .preprocess(&json!({
            "transaction_id": "x",
            "card_id": "c",
            "amount": 1,
            "merchant_id": "北京_店",
            "merchant_category": "food_🍕",
            "timestamp": 1_707_580_000,
        }))
        .unwrap();
    assert_eq!(event.merchant_id, "北京_店");
    let feats = extractor.extract(&event, &store).await;
    assert_eq!(feats.merchant_category, "food_🍕");
}
