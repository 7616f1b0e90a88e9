#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

const DEFAULT_HANDSHAKE_TIMEOUT_DURATION: Duration = Duration::from_secs(8);
const DEFAULT_RETRY_DELAY_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Configuration for WebSocket client behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum time to wait for the WebSocket handshake to complete
    pub handshake_timeout: Duration,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
    /// Certificate validation mode for `wss://` endpoints
    pub tls: TlsMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT_DURATION,
            reconnect: ReconnectConfig::default(),
            tls: TlsMode::default(),
        }
    }
}

/// Configuration for automatic reconnection behavior.
///
/// The defaults give a fixed one-second delay between attempts and give up
/// after five failures; raise `backoff_multiplier` above 1.0 for an
/// exponential schedule instead.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of connection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Initial backoff duration for the first retry
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            initial_backoff: DEFAULT_RETRY_DELAY_DURATION,
            max_backoff: DEFAULT_RETRY_DELAY_DURATION,
            backoff_multiplier: 1.0,
        }
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}

/// Certificate validation posture for TLS connections.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Validate server certificates against the platform trust roots
    #[default]
    Strict,
    /// Skip certificate validation entirely. Only for gateways behind
    /// self-signed certificates on trusted networks; logged loudly at
    /// connect time.
    AcceptInvalidCerts,
}

#[cfg(test)]
mod tests {
    use backoff::backoff::Backoff as _;

    use super::*;

    #[test]
    fn default_retry_delay_is_fixed_one_second() {
        let config = ReconnectConfig::default();
        let mut backoff: ExponentialBackoff = config.into();

        for _ in 0..4 {
            let delay = backoff.next_backoff().unwrap();
            assert_eq!(delay, Duration::from_secs(1));
        }
    }

    #[test]
    fn backoff_respects_max() {
        let config = ReconnectConfig {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 3.0,
            max_attempts: None,
        };
        let mut backoff: ExponentialBackoff = config.into();

        // Exhaust several iterations
        for _ in 0..10 {
            let _next = backoff.next_backoff();
        }

        // Should still return values capped at max
        let duration = backoff.next_backoff().unwrap();
        assert!(duration <= Duration::from_secs(2), "delay exceeds cap");
    }

    #[test]
    fn defaults_match_gateway_policy() {
        let config = Config::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(8));
        assert_eq!(config.reconnect.max_attempts, Some(5));
        assert_eq!(config.tls, TlsMode::Strict);
    }
}
