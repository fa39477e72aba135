//! Logging and tracing setup for memgate.
//!
//! Core components only emit `tracing` events. Installing a subscriber is
//! the host's job and happens at most once per process; this module offers
//! the default one, optionally driven by the integer level used at the C
//! boundary.

use std::sync::Once;
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static INIT: Once = Once::new();

/// Log levels accepted at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "python-ext", pyo3::prelude::pyclass(eq, eq_int))]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map the boundary integer to a level: 0 error .. 4 trace.
    ///
    /// Negative values clamp to `Error`, anything above 4 to `Trace`.
    pub fn from_raw(level: i32) -> Self {
        match level {
            i32::MIN..=0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn env_filter(default: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default.as_filter()))
}

/// Initialize the global tracing subscriber at the given level.
///
/// `RUST_LOG` takes precedence when set. Only the first call in a process
/// has an effect; a subscriber installed by the host is left alone.
pub fn init_with_level(level: LogLevel) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true);

        let installed = tracing_subscriber::registry()
            .with(env_filter(level))
            .with(fmt_layer)
            .try_init()
            .is_ok();

        if installed {
            info!(level = level.as_filter(), "memgate tracing initialized");
        }
    });
}

/// Initialize the global tracing subscriber at `info`.
pub fn init_tracing() {
    init_with_level(LogLevel::Info);
}

/// Initialize tracing with JSON output for structured logging.
pub fn init_tracing_json() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true);

        let installed = tracing_subscriber::registry()
            .with(env_filter(LogLevel::Info))
            .with(fmt_layer)
            .try_init()
            .is_ok();

        if installed {
            info!("memgate tracing initialized (JSON mode)");
        }
    });
}

/// Initialize logging from Python
#[cfg(feature = "python-ext")]
#[pyo3::prelude::pyfunction]
#[pyo3(signature = (level=LogLevel::Info, json=false))]
pub fn init_logging(level: LogLevel, json: bool) -> pyo3::PyResult<()> {
    if json {
        init_tracing_json();
    } else {
        init_with_level(level);
    }
    Ok(())
}

/// Log an error and hand it back, for use in `map_err` chains.
#[macro_export]
macro_rules! log_error {
    ($err:expr) => {{
        let e = $err;
        tracing::error!(error = %e, "operation failed");
        e
    }};
    ($err:expr, $msg:expr) => {{
        let e = $err;
        tracing::error!(error = %e, message = $msg, "operation failed");
        e
    }};
}
