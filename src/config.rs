use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::order::LifecycleSettings;
use crate::domain::pricing::PricingPolicy;
use crate::utils::CircuitBreakerConfig;

// ============================================================================
// Application Configuration
// ============================================================================
//
// Read once from the environment at startup. Every value has a default; a
// value that does not parse is reported and replaced by its default.
//
// | variable                   | default |
// |----------------------------|---------|
// | HTTP_PORT                  | 8080    |
// | METRICS_PORT               | 9090    |
// | SHIPPING_FLAT_RATE         | 5.99    |
// | TAX_RATE                   | 0.10    |
// | UPSTREAM_TIMEOUT_MS        | 2000    |
// | ORDER_NUMBER_MAX_ATTEMPTS  | 5       |
// | SUBSCRIBER_BUFFER          | 64      |
// | CATALOG_FAILURE_THRESHOLD  | 5       |
// | CATALOG_COOLDOWN_SECS      | 30      |
// | CATALOG_SEED_PATH          | unset   |
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
    pub metrics_port: u16,
    pub shipping_flat_rate: Decimal,
    pub tax_rate: Decimal,
    pub upstream_timeout: Duration,
    pub order_number_max_attempts: u32,
    pub subscriber_buffer: usize,
    pub catalog_failure_threshold: u32,
    pub catalog_cooldown: Duration,
    /// JSON array of products loaded into the in-memory catalog at startup
    pub catalog_seed_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        Self {
            http_port: parse_or(&get("HTTP_PORT", "8080"), "HTTP_PORT", 8080),
            metrics_port: parse_or(&get("METRICS_PORT", "9090"), "METRICS_PORT", 9090),
            shipping_flat_rate: parse_non_negative(
                &get("SHIPPING_FLAT_RATE", "5.99"),
                "SHIPPING_FLAT_RATE",
                Decimal::new(599, 2),
            ),
            tax_rate: parse_non_negative(&get("TAX_RATE", "0.10"), "TAX_RATE", Decimal::new(10, 2)),
            upstream_timeout: Duration::from_millis(parse_or(
                &get("UPSTREAM_TIMEOUT_MS", "2000"),
                "UPSTREAM_TIMEOUT_MS",
                2000,
            )),
            order_number_max_attempts: parse_or(
                &get("ORDER_NUMBER_MAX_ATTEMPTS", "5"),
                "ORDER_NUMBER_MAX_ATTEMPTS",
                5,
            )
            .max(1),
            subscriber_buffer: parse_or(&get("SUBSCRIBER_BUFFER", "64"), "SUBSCRIBER_BUFFER", 64)
                .max(1),
            catalog_failure_threshold: parse_or(
                &get("CATALOG_FAILURE_THRESHOLD", "5"),
                "CATALOG_FAILURE_THRESHOLD",
                5,
            )
            .max(1),
            catalog_cooldown: Duration::from_secs(parse_or(
                &get("CATALOG_COOLDOWN_SECS", "30"),
                "CATALOG_COOLDOWN_SECS",
                30,
            )),
            catalog_seed_path: lookup("CATALOG_SEED_PATH")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            shipping_flat_rate: self.shipping_flat_rate,
            tax_rate: self.tax_rate,
        }
    }

    pub fn catalog_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.catalog_failure_threshold,
            cooldown: self.catalog_cooldown,
            ..Default::default()
        }
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            order_number_attempts: self.order_number_max_attempts,
            store_timeout: self.upstream_timeout,
        }
    }
}

fn parse_or<T: FromStr>(raw: &str, key: &str, default: T) -> T {
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key = key, value = raw, "Invalid configuration value, using default");
            default
        }
    }
}

fn parse_non_negative(raw: &str, key: &str, default: Decimal) -> Decimal {
    let value = parse_or(raw, key, default);
    if value.is_sign_negative() {
        tracing::warn!(key = key, value = raw, "Negative configuration value, using default");
        return default;
    }
    value
}
