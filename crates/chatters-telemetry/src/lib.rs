//! # chatters-telemetry
//!
//! Structured logging setup. One call at startup installs a global
//! `tracing-subscriber` registry with an [`EnvFilter`] and a fmt layer that
//! writes either human-readable lines or JSON to stdout.
//!
//! `RUST_LOG`, when set, takes precedence over the configured levels.

#![deny(unsafe_code)]

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A configured level string is not a tracing level.
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
    /// A global subscriber was already installed.
    #[error("failed to install subscriber: {0}")]
    Install(String),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Per-module level overrides (e.g. `chatters_server` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build a config from level strings as they appear in settings.
    pub fn from_levels<'a, I>(level: &str, modules: I, json: bool) -> Result<Self, TelemetryError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let log_level = parse_level(level)?;
        let module_levels = modules
            .into_iter()
            .map(|(module, lvl)| Ok((module.to_string(), parse_level(lvl)?)))
            .collect::<Result<Vec<_>, TelemetryError>>()?;
        Ok(Self {
            log_level,
            module_levels,
            json,
        })
    }

    /// Filter directives in `EnvFilter` syntax, e.g. `info,chatters_store=debug`.
    pub fn directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push(',');
            filter.push_str(module);
            filter.push('=');
            filter.push_str(&level.to_string().to_lowercase());
        }
        filter
    }
}

fn parse_level(raw: &str) -> Result<Level, TelemetryError> {
    Level::from_str(raw.trim()).map_err(|_| TelemetryError::InvalidLevel(raw.to_string()))
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.module_levels.is_empty());
        assert!(!config.json);
        assert_eq!(config.directives(), "info");
    }

    #[test]
    fn directives_include_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("chatters_server".into(), Level::DEBUG),
                ("tower_http".into(), Level::TRACE),
            ],
            json: true,
        };
        assert_eq!(
            config.directives(),
            "warn,chatters_server=debug,tower_http=trace"
        );
    }

    #[test]
    fn from_levels_parses_strings() {
        let config =
            TelemetryConfig::from_levels("debug", [("chatters_store", "error")], false).unwrap();
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.module_levels, vec![("chatters_store".to_string(), Level::ERROR)]);
    }

    #[test]
    fn from_levels_rejects_unknown_level() {
        let err = TelemetryConfig::from_levels("loud", std::iter::empty(), false).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidLevel(ref l) if l == "loud"));
    }

    #[test]
    fn from_levels_rejects_unknown_module_level() {
        assert!(TelemetryConfig::from_levels("info", [("x", "nope")], false).is_err());
    }

    #[test]
    fn directives_parse_as_env_filter() {
        let config = TelemetryConfig::from_levels("info", [("chatters_core", "trace")], false).unwrap();
        assert!(EnvFilter::try_new(config.directives()).is_ok());
    }
}
