//! Tracing/logging initialization.
//!
//! JSON lines by default; `PHARMASTOCK_LOG_FORMAT=compact` switches to the
//! human-readable formatter for local runs. Filtering follows `RUST_LOG` and
//! falls back to `info`.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_VAR: &str = "PHARMASTOCK_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Compact,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown log format '{0}' (expected 'json' or 'compact')")]
pub struct UnknownLogFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "compact" | "pretty" | "text" => Ok(Self::Compact),
            other => Err(UnknownLogFormat(other.to_string())),
        }
    }
}

/// Initialize tracing with the format named by [`LOG_FORMAT_VAR`].
///
/// An unrecognised format falls back to JSON and says so once the
/// subscriber is up.
pub fn init() {
    let requested = std::env::var(LOG_FORMAT_VAR).ok();
    let (format, rejected) = match requested.as_deref().map(LogFormat::from_str) {
        Some(Ok(format)) => (format, None),
        Some(Err(err)) => (LogFormat::Json, Some(err)),
        None => (LogFormat::default(), None),
    };

    init_with(format);

    if let Some(err) = rejected {
        ::tracing::warn!(error = %err, "falling back to JSON logs");
    }
}

/// Initialize tracing with an explicit format. Later calls are no-ops.
pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_target(false)
            .try_init(),
    };
}
