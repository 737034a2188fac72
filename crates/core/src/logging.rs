//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,swapframe=debug,swapframe_rhi=info,vulkan=warn";

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG` when set and falls back to [`DEFAULT_FILTER`]. Calling
/// this more than once is harmless; later calls leave the first subscriber
/// in place.
///
/// # Example
/// ```
/// swapframe_core::init_logging();
/// tracing::info!("frame coordinator starting");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
