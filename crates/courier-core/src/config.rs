use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::dispatcher::DispatchSettings;
use crate::domain::{ConfigError, DEFAULT_SUBJECT};
use crate::queue::{BrokerSettings, RetryPolicy};

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Recipients per batch; also the cap on concurrent sends.
    pub batch_size: usize,

    /// Per-send timeout in milliseconds. 0 leaves timing to the gateway.
    pub send_timeout_ms: u64,

    /// How long a worker may hold a job without acknowledging it.
    pub lease_timeout_ms: u64,

    /// Broker deliveries before a job is dead-lettered.
    pub max_deliveries: u32,

    pub retry_base_delay_ms: u64,

    /// Number of worker loops sharing the broker.
    pub workers: usize,

    pub default_subject: String,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            send_timeout_ms: 10_000,
            lease_timeout_ms: 30_000,
            max_deliveries: 5,
            retry_base_delay_ms: 2_000,
            workers: 1,
            default_subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

impl CourierConfig {
    /// Load from the process environment (after reading `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key/value source. Missing keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            batch_size: parse_or(&lookup, "COURIER_BATCH_SIZE", defaults.batch_size)?,
            send_timeout_ms: parse_or(&lookup, "COURIER_SEND_TIMEOUT_MS", defaults.send_timeout_ms)?,
            lease_timeout_ms: parse_or(
                &lookup,
                "COURIER_LEASE_TIMEOUT_MS",
                defaults.lease_timeout_ms,
            )?,
            max_deliveries: parse_or(&lookup, "COURIER_MAX_DELIVERIES", defaults.max_deliveries)?,
            retry_base_delay_ms: parse_or(
                &lookup,
                "COURIER_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            )?,
            workers: parse_or(&lookup, "COURIER_WORKERS", defaults.workers)?,
            default_subject: lookup("COURIER_DEFAULT_SUBJECT")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.default_subject),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("COURIER_BATCH_SIZE", self.batch_size as u64)?;
        positive("COURIER_WORKERS", self.workers as u64)?;
        positive("COURIER_MAX_DELIVERIES", u64::from(self.max_deliveries))?;
        positive("COURIER_LEASE_TIMEOUT_MS", self.lease_timeout_ms)?;
        Ok(())
    }

    pub fn dispatch_settings(&self) -> Result<DispatchSettings, ConfigError> {
        let batch_size = NonZeroUsize::new(self.batch_size).ok_or(ConfigError::NotPositive {
            name: "COURIER_BATCH_SIZE",
            value: self.batch_size.to_string(),
        })?;
        let send_timeout =
            (self.send_timeout_ms > 0).then(|| Duration::from_millis(self.send_timeout_ms));
        Ok(DispatchSettings {
            batch_size,
            send_timeout,
        })
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            lease_timeout: Duration::from_millis(self.lease_timeout_ms),
            max_deliveries: self.max_deliveries,
            retry_policy: RetryPolicy::new(Duration::from_millis(self.retry_base_delay_ms)),
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::NotANumber {
            name,
            value: raw.clone(),
        }),
    }
}

fn positive(name: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NotPositive {
            name,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<CourierConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CourierConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config, CourierConfig::default());
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.default_subject, "Notification");
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = load(&[
            ("COURIER_BATCH_SIZE", "2"),
            ("COURIER_SEND_TIMEOUT_MS", "0"),
            ("COURIER_WORKERS", " 3 "),
            ("COURIER_DEFAULT_SUBJECT", "Heads up"),
        ])
        .unwrap();

        assert_eq!(config.batch_size, 2);
        assert_eq!(config.workers, 3);
        assert_eq!(config.default_subject, "Heads up");

        let dispatch = config.dispatch_settings().unwrap();
        assert_eq!(dispatch.batch_size.get(), 2);
        assert_eq!(dispatch.send_timeout, None);
    }

    #[test]
    fn zero_batch_size_is_a_config_error() {
        let err = load(&[("COURIER_BATCH_SIZE", "0")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotPositive {
                name: "COURIER_BATCH_SIZE",
                value: "0".into()
            }
        );

        let config = CourierConfig {
            batch_size: 0,
            ..CourierConfig::default()
        };
        assert!(config.dispatch_settings().is_err());
    }

    #[test]
    fn negative_batch_size_is_a_config_error() {
        let err = load(&[("COURIER_BATCH_SIZE", "-1")]).unwrap_err();
        assert!(matches!(err, ConfigError::NotANumber { name: "COURIER_BATCH_SIZE", .. }));
    }

    #[test]
    fn broker_settings_follow_config() {
        let config = load(&[
            ("COURIER_LEASE_TIMEOUT_MS", "1500"),
            ("COURIER_MAX_DELIVERIES", "2"),
            ("COURIER_RETRY_BASE_DELAY_MS", "100"),
        ])
        .unwrap();
        let broker = config.broker_settings();
        assert_eq!(broker.lease_timeout, Duration::from_millis(1500));
        assert_eq!(broker.max_deliveries, 2);
        assert_eq!(broker.retry_policy.base_delay, Duration::from_millis(100));
    }
}
