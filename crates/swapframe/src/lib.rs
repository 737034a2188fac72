//! Frame-in-flight and presentation-chain coordinator.
//!
//! This crate keeps a fixed number of frames in flight against a window
//! surface and rebuilds everything sized to that surface when it changes:
//!
//! - [`FrameSlotPool`]: per-frame gate, signals and recording handle
//! - [`PresentationChain`]: image chain, generation counter, recreation
//! - [`DependentResources`]: render-target description, drawable targets and
//!   pipeline, rebuilt as one group
//! - [`FrameDriver`]: the acquire, record, submit, present state machine
//!
//! The coordinator talks to the GPU only through [`GpuContext`];
//! [`VulkanContext`] is the production backend.

mod backend;
mod dependent;
mod error;
mod frame_driver;
mod frame_slot;
mod presentation;
mod vulkan;

pub use backend::{
    Acquired, ChainInfo, GateStatus, GpuContext, PipelineFactory, PipelineParams, Presented,
    SurfaceProvider, is_drawable,
};
pub use dependent::{DependentResources, DependentSet};
pub use error::{FrameError, FrameResult};
pub use frame_driver::{BeginFrame, FrameDriver, FramePhase, FrameTarget};
pub use frame_slot::{FrameSlot, FrameSlotPool};
pub use presentation::{INITIAL_GENERATION, PresentationChain};
pub use vulkan::{VulkanContext, VulkanDrawTargets, VulkanFrameDriver};
