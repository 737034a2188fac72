//! Frame coordinator error type.

use swapframe_rhi::RhiError;
use thiserror::Error;

/// Fatal errors surfaced by the frame coordinator.
///
/// Stale or suboptimal presentation chains are not errors; they are reported
/// through [`Acquired`](crate::Acquired) and [`Presented`](crate::Presented)
/// and handled in-band.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Unrecoverable GPU API failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Window, configuration or IO failure from the core layer
    #[error(transparent)]
    Core(#[from] swapframe_core::Error),

    /// Invalid coordinator parameters
    #[error("Invalid frame configuration: {0}")]
    Config(String),

    /// The surface was closed while waiting for a usable extent
    #[error("Surface closed before it had a drawable extent")]
    SurfaceClosed,
}

/// Result type alias for frame coordinator operations.
pub type FrameResult<T> = std::result::Result<T, FrameError>;
