//! Tunable parameters, read once from the environment.
//!
//! Bundled into a struct rather than bare `pub static` constants so tests
//! can build alternate configurations without touching global state.

use std::env;
use std::time::Duration;

pub const DEFAULT_INITIAL_TTL: u8 = 16;
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_RETRY_CEILING: u32 = 20;
pub const DEFAULT_MSS: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub initial_ttl: u8,
    pub ack_timeout: Duration,
    pub retry_ceiling: u32,
    pub mss: usize,
    pub loss_probability: f64,
    pub corrupt_probability: f64,
    pub max_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            initial_ttl: DEFAULT_INITIAL_TTL,
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
            retry_ceiling: DEFAULT_RETRY_CEILING,
            mss: DEFAULT_MSS,
            loss_probability: 0.0,
            corrupt_probability: 0.0,
            max_delay_ms: 0,
        }
    }
}

impl Config {
    /// Builds a `Config` from the environment, falling back to the
    /// defaults (and the all-zero fault-injection knobs) for anything
    /// unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Some(v) = env_u8("INITIAL_TTL") {
            config.initial_ttl = v;
        }
        if let Some(v) = env_u64("ACK_TIMEOUT_MS") {
            config.ack_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_u32("RETRY_CEILING") {
            config.retry_ceiling = v;
        }
        if let Some(v) = env_usize("MSS") {
            config.mss = v;
        }
        if let Some(v) = env_f64("LOSS_PROBABILITY") {
            config.loss_probability = v;
        }
        if let Some(v) = env_f64("CORRUPT_PROBABILITY") {
            config.corrupt_probability = v;
        }
        if let Some(v) = env_u64("MAX_DELAY_MS") {
            config.max_delay_ms = v;
        }
        config
    }
}

fn env_u8(key: &str) -> Option<u8> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let config = Config::default();
        assert_eq!(config.initial_ttl, 16);
        assert_eq!(config.ack_timeout, Duration::from_millis(500));
        assert_eq!(config.retry_ceiling, 20);
        assert_eq!(config.mss, 1024);
    }
}
