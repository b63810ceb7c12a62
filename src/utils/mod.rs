//! Shared helpers: logging setup and cancellation-aware awaiting

pub mod cancel;
pub mod logging;

pub use cancel::{cancellable, with_custom_timeout};
pub use logging::{init_component_logging, init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
