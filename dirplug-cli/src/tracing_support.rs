//! Tracing and logging support.
//!
//! Structured logging for the `dirplug` binary using the `tracing` crate.
//! Logs go to stderr so command output on stdout stays machine-readable.

use tracing::Subscriber;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Human-readable format with colors (default for development).
    #[default]
    Pretty,

    /// Compact format without colors.
    Compact,

    /// JSON format (recommended for production).
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter.
    ///
    /// If None, uses RUST_LOG environment variable or defaults to "info".
    pub level: Option<tracing::Level>,

    /// Output format.
    pub format: TracingFormat,

    /// Include timestamps in output.
    pub timestamps: bool,

    /// Include target module names in output.
    pub target: bool,

    /// Include thread IDs in output.
    pub thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Pretty,
            timestamps: true,
            target: true,
            thread_ids: false,
        }
    }
}

impl TracingConfig {
    fn filter(&self) -> EnvFilter {
        match self.level {
            Some(level) => EnvFilter::new(level.to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        }
    }

    fn layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(self.target)
            .with_thread_ids(self.thread_ids);

        match (self.format, self.timestamps) {
            (TracingFormat::Pretty, true) => base.pretty().boxed(),
            (TracingFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (TracingFormat::Compact, true) => base.compact().boxed(),
            (TracingFormat::Compact, false) => base.compact().without_time().boxed(),
            (TracingFormat::Json, true) => base.json().boxed(),
            (TracingFormat::Json, false) => base.json().without_time().boxed(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// # Environment Variables
///
/// - `RUST_LOG=debug` - Enable debug logs
/// - `RUST_LOG=dirplug_host=trace` - Per-module filtering
pub fn init_subscriber(config: &TracingConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(config.filter())
        .with(config.layer())
        .try_init()
}
