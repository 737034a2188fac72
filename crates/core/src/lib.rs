//! Pieces every swapframe crate shares and none of them owns: the
//! non-GPU error type, runtime configuration, `tracing` setup and a frame
//! rate meter.

mod config;
mod error;
mod logging;
mod timer;

pub use config::{Config, MAX_FRAMES_IN_FLIGHT, WindowConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use timer::Timer;
