use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Status codes which make a server's `Retry-After` guidance binding
const DEFAULT_RETRY_STATUSES: [u16; 2] = [429, 503];

/// Extra time added to every cooldown so that the server-side window has
/// certainly closed by the time requests resume
const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(1);

/// Configuration of the [`ThrottleCoordinator`](crate::ratelimit::ThrottleCoordinator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Response status codes that install a cooldown when they carry `Retry-After`
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: BTreeSet<u16>,

    /// Added on top of the cooldown requested by the server
    #[serde(default = "default_safety_margin", with = "humantime_serde")]
    pub safety_margin: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            retry_statuses: default_retry_statuses(),
            safety_margin: default_safety_margin(),
        }
    }
}

fn default_retry_statuses() -> BTreeSet<u16> {
    DEFAULT_RETRY_STATUSES.into_iter().collect()
}

const fn default_safety_margin() -> Duration {
    DEFAULT_SAFETY_MARGIN
}

impl ThrottleConfig {
    /// Create a `ThrottleConfig` from CLI options, using defaults for missing values
    #[must_use]
    pub fn from_options(retry_statuses: Vec<u16>, safety_margin: Option<Duration>) -> Self {
        let retry_statuses = if retry_statuses.is_empty() {
            default_retry_statuses()
        } else {
            retry_statuses.into_iter().collect()
        };

        Self {
            retry_statuses,
            safety_margin: safety_margin.unwrap_or(DEFAULT_SAFETY_MARGIN),
        }
    }

    /// Whether a response with this status may install a cooldown
    #[must_use]
    pub fn is_retry_status(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_throttle_config() {
        let config = ThrottleConfig::default();
        assert_eq!(config.retry_statuses, BTreeSet::from([429, 503]));
        assert_eq!(config.safety_margin, Duration::from_secs(1));

        assert!(config.is_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(config.is_retry_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!config.is_retry_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!config.is_retry_status(StatusCode::OK));
    }

    #[test]
    fn test_from_options() {
        let config = ThrottleConfig::from_options(vec![], None);
        assert_eq!(config, ThrottleConfig::default());

        let config = ThrottleConfig::from_options(vec![502, 502], Some(Duration::ZERO));
        assert_eq!(config.retry_statuses, BTreeSet::from([502]));
        assert_eq!(config.safety_margin, Duration::ZERO);
    }

    #[test]
    fn test_config_serialization() {
        let config = ThrottleConfig {
            retry_statuses: BTreeSet::from([429]),
            safety_margin: Duration::from_millis(250),
        };

        let toml = toml::to_string(&config).unwrap();
        let deserialized: ThrottleConfig = toml::from_str(&toml).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_defaults_from_toml() {
        let config: ThrottleConfig = toml::from_str("safety_margin = \"2s\"").unwrap();
        assert_eq!(config.retry_statuses, BTreeSet::from([429, 503]));
        assert_eq!(config.safety_margin, Duration::from_secs(2));

        assert!(toml::from_str::<ThrottleConfig>("unknown = 1").is_err());
    }
}
