//! Collaborator interfaces consumed by the frame coordinator.
//!
//! The coordinator never names a Vulkan type except extents and formats. It
//! drives a [`GpuContext`] for every GPU object and operation, asks a
//! [`SurfaceProvider`] for the drawable size, and delegates pipeline
//! construction to a [`PipelineFactory`]. [`VulkanContext`] is the production
//! implementation; tests substitute an in-memory backend.
//!
//! [`VulkanContext`]: crate::VulkanContext

use std::time::Duration;

use ash::vk;
use swapframe_rhi::RhiResult;

/// Outcome of waiting on a cpu gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateStatus {
    Signaled,
    TimedOut,
}

/// Outcome of requesting the next presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    /// The image is usable and the chain matches the surface.
    Ready(u32),
    /// The image is usable this frame, but the chain should be recreated
    /// after presenting it.
    SuboptimalButUsable(u32),
    /// The chain no longer matches the surface; no image was acquired.
    NeedsRecreate,
    /// No image became available within the timeout.
    TimedOut,
}

impl Acquired {
    /// Index of the acquired image, if one was acquired.
    pub fn image_index(self) -> Option<u32> {
        match self {
            Acquired::Ready(index) | Acquired::SuboptimalButUsable(index) => Some(index),
            Acquired::NeedsRecreate | Acquired::TimedOut => None,
        }
    }
}

/// Outcome of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presented {
    Ok,
    SuboptimalButUsable,
    NeedsRecreate,
}

impl Presented {
    /// The chain should be recreated before the next frame.
    #[inline]
    pub fn wants_recreate(self) -> bool {
        !matches!(self, Presented::Ok)
    }
}

/// Parameters fixed for the lifetime of one presentation chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainInfo {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub image_count: u32,
}

/// Device/context provider.
///
/// Every GPU object the coordinator uses is one of the associated types and
/// is released by dropping it. The coordinator only destroys objects that
/// the GPU may reference after [`GpuContext::wait_idle`] or a gate wait.
pub trait GpuContext {
    /// CPU-visible completion signal (a fence).
    type Gate;
    /// GPU-side ordering signal (a binary semaphore).
    type Signal;
    /// Reusable command recording handle.
    type Recording;
    /// Presentation image chain.
    type Chain;
    /// Render-target description (a render pass).
    type TargetDescription;
    /// Drawable targets for every image of one chain.
    type DrawTargets;
    /// Drawable target for one chain image.
    type DrawTarget;
    /// Rendering pipeline built against a target description.
    type Pipeline;

    fn create_gate(&self, signaled: bool) -> RhiResult<Self::Gate>;

    /// Block until `gate` signals or `timeout` elapses.
    fn wait_gate(&self, gate: &Self::Gate, timeout: Duration) -> RhiResult<GateStatus>;

    fn reset_gate(&self, gate: &Self::Gate) -> RhiResult<()>;

    fn create_signal(&self) -> RhiResult<Self::Signal>;

    fn create_recording(&self) -> RhiResult<Self::Recording>;

    /// Discard previous contents and start recording.
    fn begin_recording(&self, recording: &Self::Recording) -> RhiResult<()>;

    fn end_recording(&self, recording: &Self::Recording) -> RhiResult<()>;

    /// Create a chain for `extent`, handing `previous` over to the driver.
    fn create_chain(
        &self,
        extent: vk::Extent2D,
        previous: Option<&Self::Chain>,
    ) -> RhiResult<Self::Chain>;

    fn chain_info(&self, chain: &Self::Chain) -> ChainInfo;

    /// Request the next image, signaling `signal` once it is usable.
    fn acquire_image(
        &self,
        chain: &Self::Chain,
        signal: &Self::Signal,
        timeout: Duration,
    ) -> RhiResult<Acquired>;

    /// Submit `recording` after `wait`, signaling `signal` and `gate` on
    /// completion.
    fn submit(
        &self,
        recording: &Self::Recording,
        wait: &Self::Signal,
        signal: &Self::Signal,
        gate: &Self::Gate,
    ) -> RhiResult<()>;

    /// Queue `image_index` for display once `wait` has signaled. Never blocks
    /// on GPU completion.
    fn present(
        &self,
        chain: &Self::Chain,
        image_index: u32,
        wait: &Self::Signal,
    ) -> RhiResult<Presented>;

    /// Block until all submitted work has completed.
    fn wait_idle(&self) -> RhiResult<()>;

    fn create_target_description(&self, info: &ChainInfo) -> RhiResult<Self::TargetDescription>;

    fn create_draw_targets(
        &self,
        chain: &Self::Chain,
        description: &Self::TargetDescription,
    ) -> RhiResult<Self::DrawTargets>;

    fn draw_target<'a>(
        &self,
        targets: &'a Self::DrawTargets,
        image_index: u32,
    ) -> Option<&'a Self::DrawTarget>;

    /// Open `target` for drawing: clear it and set viewport and scissor to
    /// `extent`.
    fn begin_target(
        &self,
        recording: &Self::Recording,
        description: &Self::TargetDescription,
        target: &Self::DrawTarget,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    );

    fn end_target(&self, recording: &Self::Recording);
}

/// Surface/window provider.
pub trait SurfaceProvider {
    /// Current drawable size in pixels. Zero while minimized.
    fn drawable_extent(&self) -> vk::Extent2D;

    /// Block until the window system delivers at least one event.
    fn wait_events(&mut self);

    /// The surface is going away; waiting for a usable extent is pointless.
    fn close_requested(&self) -> bool {
        false
    }
}

/// What a pipeline is built against.
pub struct PipelineParams<'a, C: GpuContext + ?Sized> {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub description: &'a C::TargetDescription,
}

/// Builds the rendering pipeline for the current chain.
///
/// Called once when registered and again after every recreation.
pub trait PipelineFactory<C: GpuContext> {
    fn build(&mut self, context: &C, params: &PipelineParams<'_, C>) -> RhiResult<C::Pipeline>;
}

impl<C, F> PipelineFactory<C> for F
where
    C: GpuContext,
    F: FnMut(&C, &PipelineParams<'_, C>) -> RhiResult<C::Pipeline>,
{
    fn build(&mut self, context: &C, params: &PipelineParams<'_, C>) -> RhiResult<C::Pipeline> {
        self(context, params)
    }
}

/// Whether `extent` has a non-zero area.
#[inline]
pub fn is_drawable(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}
