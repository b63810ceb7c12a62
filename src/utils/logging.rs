//! Logging initialisation for hosts and component processes
//!
//! `RUST_LOG` always takes precedence over a configured filter. Output goes
//! to stderr; ANSI colours are disabled when `NO_COLOR` is set.
//!
//! ```rust,no_run
//! use component_loader::utils::init_logging;
//!
//! init_logging(None); // RUST_LOG or "info"
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter(filter: Option<&str>, default: &str) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or(default))
}

/// Initialize logging for the host process
///
/// # Arguments
/// * `filter` - Optional filter from config (e.g. "info", "component_loader::resolver=debug").
///   Ignored when RUST_LOG is set; defaults to "info".
pub fn init_logging(filter: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter(filter, "info"))
        .try_init();
}

/// Initialize logging inside a component process
///
/// Defaults to `{component}=info,component_loader::ipc=debug` so the
/// component's own logs and its IPC traffic are visible.
pub fn init_component_logging(component: &str, filter: Option<&str>) {
    let default_filter = format!("{}=info,component_loader::ipc=debug", component);
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter(filter, &default_filter))
        .try_init();
}

/// Initialize logging with JSON output for log aggregation
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(env_filter(filter, "info"))
        .try_init();
}

/// Initialize logging from the host configuration
pub fn init_logging_from_config(config: Option<&crate::config::LoggingConfig>) {
    let filter = config.and_then(|c| c.filter.as_deref());

    if config.map(|c| c.json_format).unwrap_or(false) {
        #[cfg(feature = "json-logging")]
        {
            init_json_logging(filter);
        }
        #[cfg(not(feature = "json-logging"))]
        {
            init_logging(filter);
        }
    } else {
        init_logging(filter);
    }
}
