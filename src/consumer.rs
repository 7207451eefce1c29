//! Consumer loop (C5): subscribes to the transactions topic, dispatches
//! each message through preprocess → extract → update_state → emit, and
//! meters latency. Logically single-threaded per partition — partitions
//! are drained sequentially in one task, which preserves the per-card
//! ordering the partition key already guarantees without the complexity of
//! a worker-thread-per-partition split this workload doesn't need.

use std::sync::Arc;
use std::time::Instant;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::features::{FeatureExtractor, FeatureVector};
use crate::metrics::Metrics;
use crate::preprocessor::Preprocessor;
use crate::store::StateStore;

pub struct ConsumerLoop {
    consumer: StreamConsumer,
    preprocessor: Preprocessor,
    extractor: FeatureExtractor,
    store: Arc<dyn StateStore>,
    metrics: Arc<Metrics>,
    stats_print_interval: u64,
}

impl ConsumerLoop {
    pub fn new(config: &Config, store: Arc<dyn StateStore>, metrics: Arc<Metrics>) -> Result<Self, rdkafka::error::KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_bootstrap_servers)
            .set("group.id", &config.consumer_group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set("max.poll.records", "100")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "10000")
            .create()?;

        consumer.subscribe(&[&config.kafka_topic])?;

        Ok(Self {
            consumer,
            preprocessor: Preprocessor::new(config),
            extractor: FeatureExtractor::new(config),
            store,
            metrics,
            stats_print_interval: config.stats_print_interval,
        })
    }

    /// Run until `shutdown` resolves. Cooperative: the running flag is
    /// checked between events, never mid-event — no partial writes are
    /// ever dropped.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut processed_since_log = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown signal received, draining in-flight work");
                    break;
                }
                message = self.consumer.recv() => {
                    match message {
                        Ok(borrowed) => {
                            self.handle_message(&borrowed).await;
                            processed_since_log += 1;
                            if processed_since_log >= self.stats_print_interval {
                                self.metrics.log_summary();
                                processed_since_log = 0;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "kafka poll error");
                        }
                    }
                }
            }
        }

        self.metrics.log_summary();
        info!("consumer loop stopped");
    }

    async fn handle_message(&self, message: &rdkafka::message::BorrowedMessage<'_>) {
        let t0 = Instant::now();

        let payload = match message.payload_view::<str>() {
            Some(Ok(s)) => s,
            Some(Err(err)) => {
                error!(error = %err, "message payload is not valid utf-8");
                self.metrics.record_failed("deserialize");
                return;
            }
            None => {
                error!("message has no payload");
                self.metrics.record_failed("deserialize");
                return;
            }
        };

        let raw: crate::event::RawEvent = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(err) => {
                error!(error = %err, "failed to deserialize message as json");
                self.metrics.record_failed("deserialize");
                return;
            }
        };

        let event = match self.preprocessor.preprocess(&raw) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err.to_string(), "dropping event");
                self.metrics.record_failed("preprocess");
                return;
            }
        };

        let t_extract = Instant::now();
        let features = self.extractor.extract(&event, self.store.as_ref()).await;
        self.metrics.record_extract(t_extract.elapsed());

        let t_store = Instant::now();
        self.extractor.update_state(&event, self.store.as_ref()).await;
        self.metrics.record_store_update(t_store.elapsed());

        self.emit(&features);

        self.metrics.record_processed();
        self.metrics.record_total(t0.elapsed());
        debug!(transaction_id = %event.transaction_id, elapsed_us = t0.elapsed().as_micros(), "event processed");
    }

    /// Downstream emission is out of scope for this core; logging the
    /// vector at debug level stands in for "publish it somewhere".
    fn emit(&self, features: &FeatureVector) {
        debug!(transaction_id = %features.transaction_id, "feature vector ready");
    }
}
