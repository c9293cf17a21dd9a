use booking_core::CircuitBreakerConfig;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub flight_service: FlightServiceConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection string. Without one the service keeps bookings in memory.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            run_migrations: default_run_migrations(),
        }
    }
}

fn default_max_connections() -> u32 { 5 }
fn default_run_migrations() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct FlightServiceConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 { 3000 }

impl FlightServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Tuning for the breaker around the flight service.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_rate_threshold: f64,
    pub sliding_window_size: usize,
    pub minimum_number_of_calls: usize,
    pub wait_duration_in_open_state_secs: u64,
    pub permitted_calls_in_half_open_state: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_rate_threshold: defaults.failure_rate_threshold,
            sliding_window_size: defaults.sliding_window_size,
            minimum_number_of_calls: defaults.minimum_number_of_calls,
            wait_duration_in_open_state_secs: defaults.wait_duration_in_open_state.as_secs(),
            permitted_calls_in_half_open_state: defaults.permitted_calls_in_half_open_state,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_rate_threshold: settings.failure_rate_threshold,
            sliding_window_size: settings.sliding_window_size,
            minimum_number_of_calls: settings.minimum_number_of_calls,
            wait_duration_in_open_state: Duration::from_secs(
                settings.wait_duration_in_open_state_secs,
            ),
            permitted_calls_in_half_open_state: settings.permitted_calls_in_half_open_state,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Environment, e.g. `BOOKING__SERVER__PORT=9090`
            .add_source(config::Environment::with_prefix("BOOKING").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("Failed to parse config")
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [server]
            port = 8083

            [flight_service]
            base_url = "http://flights:8082"
            "#,
        );
        assert!(config.database.url.is_none());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.flight_service.timeout(), Duration::from_millis(3000));
        assert_eq!(config.circuit_breaker, CircuitBreakerSettings::default());
    }

    #[test]
    fn test_breaker_settings_convert() {
        let config = parse(
            r#"
            [server]
            port = 1

            [flight_service]
            base_url = "http://flights"

            [circuit_breaker]
            failure_rate_threshold = 25.0
            sliding_window_size = 20
            wait_duration_in_open_state_secs = 5
            "#,
        );
        let breaker = CircuitBreakerConfig::from(&config.circuit_breaker);
        assert_eq!(breaker.failure_rate_threshold, 25.0);
        assert_eq!(breaker.sliding_window_size, 20);
        assert_eq!(breaker.minimum_number_of_calls, 5);
        assert_eq!(breaker.wait_duration_in_open_state, Duration::from_secs(5));
    }
}
