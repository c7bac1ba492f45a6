//! Logging setup.
//!
//! The library only emits `tracing` events. Binaries and tests that want to see them
//! call [`init_logging`] once.
//!
//! # Environment Variables
//!
//! - `TOPICVAULT_LOG`: Filter directive (like `RUST_LOG`), e.g. `topicvault=debug`
//! - `TOPICVAULT_LOG_FORMAT`: `compact` (default) or `pretty`

use crate::error::{Result, TopicVaultError};
use std::env;
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const LOG_ENV: &str = "TOPICVAULT_LOG";
pub const LOG_FORMAT_ENV: &str = "TOPICVAULT_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

impl LogFormat {
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "compact" => Some(LogFormat::Compact),
            "pretty" => Some(LogFormat::Pretty),
            _ => None,
        }
    }

    fn from_env() -> Self {
        env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|v| Self::parse_str(&v))
            .unwrap_or_default()
    }
}

/// `TOPICVAULT_LOG` if set and valid, `default_directive` otherwise.
pub fn build_env_filter(default_directive: &str) -> EnvFilter {
    env::var(LOG_ENV)
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive))
}

/// Installs a stderr subscriber. Fails if a global subscriber is already set.
pub fn init_logging(default_directive: &str) -> Result<()> {
    let registry = Registry::default().with(build_env_filter(default_directive));
    let installed = match LogFormat::from_env() {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(io::stderr))
            .try_init(),
    };
    installed.map_err(|err| TopicVaultError::Config(format!("failed to install logger: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse_str("PRETTY"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse_str("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse_str("json"), None);
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_logging("warn");
        assert!(init_logging("warn").is_err());
    }
}
