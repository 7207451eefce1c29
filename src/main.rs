//! Real-time feature engineering pipeline for credit-card fraud detection.
//!
//! Consumes transaction events from the `transactions` topic, computes a
//! fixed feature vector per event against per-card state in Redis, and
//! writes that state back so future events see the effect of this one.

use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fraud_feature_engine::config::Config;
use fraud_feature_engine::consumer::ConsumerLoop;
use fraud_feature_engine::metrics::Metrics;
use fraud_feature_engine::store::{RedisStateStore, StateStore};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env();
    tracing::info!(
        kafka_bootstrap_servers = %config.kafka_bootstrap_servers,
        redis_url = %config.redis_url(),
        "starting fraud feature engine",
    );

    PrometheusBuilder::new()
        .with_http_listener(config.metrics_listen_addr)
        .install()
        .context("failed to install the prometheus metrics exporter")?;
    tracing::info!(addr = %config.metrics_listen_addr, "prometheus exporter listening");

    let store = RedisStateStore::connect(&config)
        .await
        .context("failed to connect to the state store")?;
    let store: Arc<dyn StateStore> = Arc::new(store);

    if !store.health_check().await {
        anyhow::bail!("state store failed initial health check");
    }

    let metrics = Arc::new(Metrics::new());

    let consumer = ConsumerLoop::new(&config, store, metrics)
        .context("failed to construct the kafka consumer")?;

    let shutdown = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    };

    consumer.run(shutdown).await;

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fraud_feature_engine=info".into()),
        )
        .with(fmt::layer())
        .init();
}
