//! Logging initialization for Parley.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact single-line output; use the [`log_component!`]
//!   macro to add a `component` field for per-subsystem filtering
//! - `json`: structured JSON lines for log aggregators

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{ParleyError, Result};

/// Initialize the global tracing subscriber from config.
///
/// Call once at startup. `RUST_LOG` takes precedence over `cfg.level`.
/// When `cfg.file` is set, output goes to that file (appended) instead of
/// stderr.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let file = match &cfg.file {
        Some(path) => Some(Arc::new(OpenOptions::new().create(true).append(true).open(path)?)),
        None => None,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match (cfg.format, file) {
        (LogFormat::Json, Some(file)) => builder.json().with_writer(file).try_init(),
        (LogFormat::Json, None) => builder.json().with_writer(std::io::stderr).try_init(),
        (LogFormat::Pretty, Some(file)) => builder.pretty().with_writer(file).try_init(),
        (LogFormat::Pretty, None) => builder.pretty().with_writer(std::io::stderr).try_init(),
        (LogFormat::Component, Some(file)) => builder
            .compact()
            .with_target(true)
            .with_writer(file)
            .try_init(),
        (LogFormat::Component, None) => builder
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    result.map_err(|e| ParleyError::Config(format!("failed to initialize logging: {}", e)))
}

/// Emit a component-tagged tracing event.
///
/// ```
/// # use parley::log_component;
/// log_component!(info, "store", "conversation evicted");
/// log_component!(warn, "compactor", "summary skipped", turns = 64u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}

#[cfg(test)]
mod tests {
    use crate::config::{LogFormat, LoggingConfig};

    #[test]
    fn test_default_logging_config() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.format, LogFormat::Pretty);
        assert_eq!(cfg.level, "info");
        assert!(cfg.file.is_none());
    }

    #[test]
    fn test_log_format_deserialize() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"format":"json","level":"debug"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "debug");

        let cfg: LoggingConfig = serde_json::from_str(r#"{"format":"component"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Component);
        assert_eq!(cfg.level, "info");
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
