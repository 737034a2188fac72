//! Thin RAII layer over `ash` covering what a presentation loop touches.
//!
//! Every wrapper keeps an `Arc<Device>` and destroys its handle on drop;
//! raw handles stay reachable through `handle()` for direct `ash` calls.
//! Presentation results that callers must classify (out of date,
//! suboptimal, timeout) come back as `vk::Result` rather than [`RhiError`].

mod error;
mod memory;

pub mod buffer;
pub mod command;
pub mod depth;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
