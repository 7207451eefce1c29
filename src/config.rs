//! Application configuration.
//!
//! Every env-driven setting is read once, here, and threaded through
//! construction of the rest of the engine. Nothing downstream reads
//! `std::env` directly.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Named velocity windows, e.g. `("10m", 600)`.
pub type VelocityWindows = BTreeMap<&'static str, i64>;

#[derive(Debug, Clone)]
pub struct Config {
    pub kafka_bootstrap_servers: String,
    pub kafka_topic: String,
    pub consumer_group_id: String,

    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,
    pub redis_pool_size: usize,
    pub redis_socket_timeout: Duration,

    pub velocity_windows: VelocityWindows,
    pub rolling_avg_alpha: f64,
    pub default_avg_amount: f64,
    pub amount_clip_value: f64,

    pub tx_history_ttl_secs: i64,
    pub merchant_set_ttl_secs: i64,
    pub card_stats_ttl_secs: i64,

    pub stats_print_interval: u64,
    pub metrics_listen_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Config {
    /// Build configuration from the environment, falling back to the
    /// defaults documented in the spec when a variable is absent or
    /// unparseable. Never panics.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let kafka_bootstrap_servers = std::env::var("KAFKA_BOOTSTRAP_SERVERS")
            .unwrap_or_else(|_| "localhost:9092".to_string());

        let consumer_group_id = std::env::var("CONSUMER_GROUP_ID")
            .unwrap_or_else(|_| "fraud-detection-consumer".to_string());

        let redis_host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());

        let redis_port = std::env::var("REDIS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(6379);

        let redis_db = std::env::var("REDIS_DB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let metrics_listen_addr = std::env::var("METRICS_LISTEN_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| "0.0.0.0:9898".parse().unwrap());

        let mut velocity_windows: VelocityWindows = BTreeMap::new();
        velocity_windows.insert("10m", 600);
        velocity_windows.insert("1h", 3600);
        velocity_windows.insert("24h", 86_400);

        Self {
            kafka_bootstrap_servers,
            kafka_topic: "transactions".to_string(),
            consumer_group_id,
            redis_host,
            redis_port,
            redis_db,
            redis_pool_size: 50,
            redis_socket_timeout: Duration::from_secs(5),
            velocity_windows,
            rolling_avg_alpha: 0.1,
            default_avg_amount: 75.0,
            amount_clip_value: 10_000.0,
            tx_history_ttl_secs: 86_400,
            merchant_set_ttl_secs: 86_400,
            card_stats_ttl_secs: 2_592_000,
            stats_print_interval: 100,
            metrics_listen_addr,
        }
    }

    pub fn redis_url(&self) -> String {
        format!(
            "redis://{}:{}/{}",
            self.redis_host, self.redis_port, self.redis_db
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        std::env::remove_var("REDIS_HOST");
        std::env::remove_var("REDIS_PORT");
        std::env::remove_var("CONSUMER_GROUP_ID");
        let cfg = Config::from_env();
        assert_eq!(cfg.redis_host, "localhost");
        assert_eq!(cfg.redis_port, 6379);
        assert_eq!(cfg.consumer_group_id, "fraud-detection-consumer");
        assert_eq!(cfg.velocity_windows["10m"], 600);
        assert_eq!(cfg.velocity_windows["1h"], 3600);
        assert_eq!(cfg.velocity_windows["24h"], 86_400);
        assert_eq!(cfg.rolling_avg_alpha, 0.1);
        assert_eq!(cfg.default_avg_amount, 75.0);
        assert_eq!(cfg.amount_clip_value, 10_000.0);
    }
}
