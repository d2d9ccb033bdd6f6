//! Observability utilities.
//!
//! Libraries never install a global subscriber on their own; embedding
//! applications call [`init_tracing`] once at startup.

mod timer;

pub use timer::SpanTimer;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "resumeflow=info";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Plain,
    /// One JSON object per line.
    Json,
}

/// Installs a global `tracing` subscriber.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = env_filter();
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = match format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_deserialize() {
        let format: LogFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Plain);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(LogFormat::Plain);
        assert!(!init_tracing(LogFormat::Json));
    }
}
