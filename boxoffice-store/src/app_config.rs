use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

/// Seat grid shared by every show of the venue.
#[derive(Debug, Deserialize, Clone)]
pub struct VenueConfig {
    pub rows: u8,
    pub columns: u8,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self { rows: 7, columns: 10 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdempotencyConfig {
    pub retention_seconds: u64,
    pub pending_lease_seconds: u64,
}

impl IdempotencyConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    pub fn pending_lease(&self) -> Duration {
        Duration::from_secs(self.pending_lease_seconds)
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            retention_seconds: 24 * 60 * 60,
            pending_lease_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutboxConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub grace_ms: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            batch_size: 100,
            max_attempts: 10,
            grace_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub unpaid_hold_hours: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            unpaid_hold_hours: 48,
            sweep_interval_seconds: 300,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides, 'development' unless RUN_MODE says otherwise
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `BOXOFFICE__SERVER__PORT=8080` sets `server.port`
            .add_source(config::Environment::with_prefix("BOXOFFICE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_sections_fall_back_to_defaults() {
        let raw = r#"
            [server]
            port = 3000
            [database]
            url = "postgres://localhost/boxoffice"
            [redis]
            url = "redis://localhost"
            [kafka]
            brokers = "localhost:9092"
            [outbox]
            poll_interval_ms = 250
            batch_size = 10
            max_attempts = 3
            grace_ms = 100
        "#;
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.venue.rows, 7);
        assert_eq!(config.venue.columns, 10);
        assert_eq!(config.outbox.max_attempts, 3);
        assert_eq!(config.business_rules.unpaid_hold_hours, 48);
        assert_eq!(config.idempotency.pending_lease(), Duration::from_secs(30));
    }
}
