//! Error taxonomy for the feature engine.
//!
//! Preprocessing failures are per-event and non-fatal to the consumer loop;
//! store failures never escape the store boundary (see `store::StateStore`).
//! Only startup failures (no Kafka, no Redis) are fatal.

use thiserror::Error;

/// Failure modes surfaced by the event preprocessor (C1).
///
/// Both variants are non-fatal: the consumer loop logs and skips the event.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PreprocessError {
    #[error("schema error: {0}")]
    Schema(String),
    #[error("range error: {0}")]
    Range(String),
}

/// Internal store failure, caught at the `StateStore` boundary and
/// translated into a default-valued read or a `false` write result.
/// Never propagated past `store::RedisStateStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}
