//! Vulkan implementation of the backend traits.
//!
//! [`VulkanContext`] owns the instance, the window surface, the logical device
//! and the command pool the frame slots allocate from. Every associated type
//! of [`GpuContext`] is one of the RAII wrappers from `swapframe_rhi`.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, info};

use swapframe_core::Config;
use swapframe_platform::{Surface, WindowHost};
use swapframe_rhi::command::{CommandBuffer, CommandPool};
use swapframe_rhi::depth::{DEFAULT_DEPTH_FORMAT, DepthBuffer};
use swapframe_rhi::device::Device;
use swapframe_rhi::instance::{Instance, InstanceDesc};
use swapframe_rhi::physical_device::{PhysicalDeviceInfo, select_physical_device};
use swapframe_rhi::pipeline::Pipeline;
use swapframe_rhi::render_pass::{Framebuffer, RenderPass};
use swapframe_rhi::swapchain::{Swapchain, SwapchainDesc};
use swapframe_rhi::sync::{Fence, Semaphore};
use swapframe_rhi::{RhiError, RhiResult};

use crate::backend::{Acquired, ChainInfo, GateStatus, GpuContext, Presented, SurfaceProvider};
use crate::error::FrameResult;
use crate::frame_driver::FrameDriver;

/// Frame driver over the Vulkan backend and a winit window.
pub type VulkanFrameDriver = FrameDriver<VulkanContext, WindowHost>;

/// Framebuffers for every chain image plus the shared depth buffer.
pub struct VulkanDrawTargets {
    // Framebuffers reference the depth view, so they go first.
    framebuffers: Vec<Framebuffer>,
    _depth: Option<DepthBuffer>,
}

/// Device, surface and command pool for one window.
///
/// Drop order follows field order: the pool and the device go before the
/// surface, and the surface before the instance.
pub struct VulkanContext {
    command_pool: Arc<CommandPool>,
    device: Arc<Device>,
    physical_device: PhysicalDeviceInfo,
    surface: Surface,
    instance: Instance,
    vsync: bool,
    depth: bool,
}

impl VulkanContext {
    /// Bootstrap Vulkan for `host`'s window.
    ///
    /// # Errors
    ///
    /// Returns an error if Vulkan cannot be loaded, no GPU can present to the
    /// window, or any object creation fails.
    pub fn new(host: &WindowHost, config: &Config) -> FrameResult<Self> {
        let surface_extensions = host.required_extensions()?;
        let instance = Instance::new(&InstanceDesc {
            application_name: c"swapframe",
            surface_extensions: &surface_extensions,
            enable_validation: config.validation,
        })?;

        let surface = host.create_surface(instance.entry(), instance.handle())?;
        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let graphics_family = physical_device
            .queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = Arc::new(CommandPool::new(device.clone(), graphics_family)?);

        info!(
            vsync = config.vsync,
            depth = config.depth,
            validation = instance.has_validation(),
            "Vulkan context ready on '{}'",
            physical_device.device_name()
        );

        Ok(Self {
            command_pool,
            device,
            physical_device,
            surface,
            instance,
            vsync: config.vsync,
            depth: config.depth,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl GpuContext for VulkanContext {
    type Gate = Fence;
    type Signal = Semaphore;
    type Recording = CommandBuffer;
    type Chain = Swapchain;
    type TargetDescription = RenderPass;
    type DrawTargets = VulkanDrawTargets;
    type DrawTarget = Framebuffer;
    type Pipeline = Pipeline;

    fn create_gate(&self, signaled: bool) -> RhiResult<Fence> {
        Fence::new(self.device.clone(), signaled)
    }

    fn wait_gate(&self, gate: &Fence, timeout: Duration) -> RhiResult<GateStatus> {
        if gate.wait(timeout)? {
            Ok(GateStatus::Signaled)
        } else {
            Ok(GateStatus::TimedOut)
        }
    }

    fn reset_gate(&self, gate: &Fence) -> RhiResult<()> {
        gate.reset()
    }

    fn create_signal(&self) -> RhiResult<Semaphore> {
        Semaphore::new(self.device.clone())
    }

    fn create_recording(&self) -> RhiResult<CommandBuffer> {
        CommandBuffer::new(self.command_pool.clone())
    }

    fn begin_recording(&self, recording: &CommandBuffer) -> RhiResult<()> {
        recording.restart()
    }

    fn end_recording(&self, recording: &CommandBuffer) -> RhiResult<()> {
        recording.finish()
    }

    fn create_chain(
        &self,
        extent: vk::Extent2D,
        previous: Option<&Swapchain>,
    ) -> RhiResult<Swapchain> {
        let desc = SwapchainDesc {
            extent,
            vsync: self.vsync,
        };
        Swapchain::new(
            &self.instance,
            self.device.clone(),
            self.surface.handle(),
            &desc,
            previous,
        )
    }

    fn chain_info(&self, chain: &Swapchain) -> ChainInfo {
        ChainInfo {
            extent: chain.extent(),
            format: chain.format(),
            image_count: chain.image_count(),
        }
    }

    fn acquire_image(
        &self,
        chain: &Swapchain,
        signal: &Semaphore,
        timeout: Duration,
    ) -> RhiResult<Acquired> {
        match chain.acquire_next_image(signal.handle(), timeout) {
            Ok((image_index, false)) => Ok(Acquired::Ready(image_index)),
            Ok((image_index, true)) => Ok(Acquired::SuboptimalButUsable(image_index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::NeedsRecreate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(Acquired::TimedOut),
            Err(e) => Err(e.into()),
        }
    }

    fn submit(
        &self,
        recording: &CommandBuffer,
        wait: &Semaphore,
        signal: &Semaphore,
        gate: &Fence,
    ) -> RhiResult<()> {
        let wait_semaphores = [wait.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [recording.handle()];
        let signal_semaphores = [signal.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: every handle is owned by a live wrapper borrowed for this
        // call, and the driver resets `gate` right before recording.
        unsafe { self.device.submit_graphics(&[submit_info], gate.handle()) }
    }

    fn present(&self, chain: &Swapchain, image_index: u32, wait: &Semaphore) -> RhiResult<Presented> {
        match chain.present(self.device.present_queue(), image_index, wait.handle()) {
            Ok(false) => Ok(Presented::Ok),
            Ok(true) => Ok(Presented::SuboptimalButUsable),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::NeedsRecreate),
            Err(e) => Err(e.into()),
        }
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn create_target_description(&self, info: &ChainInfo) -> RhiResult<RenderPass> {
        let depth_format = self.depth.then_some(DEFAULT_DEPTH_FORMAT);
        RenderPass::for_presentation(self.device.clone(), info.format, depth_format)
    }

    fn create_draw_targets(
        &self,
        chain: &Swapchain,
        description: &RenderPass,
    ) -> RhiResult<VulkanDrawTargets> {
        let extent = chain.extent();
        let depth = description
            .depth_format()
            .map(|format| DepthBuffer::new(self.device.clone(), extent, format))
            .transpose()?;
        let depth_view = depth.as_ref().map(DepthBuffer::image_view);

        let framebuffers = chain
            .image_views()
            .iter()
            .map(|&view| Framebuffer::new(self.device.clone(), description, view, depth_view, extent))
            .collect::<RhiResult<Vec<_>>>()?;

        debug!(
            "Created {} framebuffer(s){}",
            framebuffers.len(),
            if depth.is_some() { " with depth" } else { "" }
        );
        Ok(VulkanDrawTargets {
            framebuffers,
            _depth: depth,
        })
    }

    fn draw_target<'a>(
        &self,
        targets: &'a VulkanDrawTargets,
        image_index: u32,
    ) -> Option<&'a Framebuffer> {
        targets.framebuffers.get(image_index as usize)
    }

    fn begin_target(
        &self,
        recording: &CommandBuffer,
        description: &RenderPass,
        target: &Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) {
        recording.begin_render_pass(
            description.handle(),
            target.handle(),
            extent,
            &description.clear_values(clear_color),
        );
    }

    fn end_target(&self, recording: &CommandBuffer) {
        recording.end_render_pass();
    }
}

impl SurfaceProvider for WindowHost {
    fn drawable_extent(&self) -> vk::Extent2D {
        WindowHost::drawable_extent(self)
    }

    fn wait_events(&mut self) {
        WindowHost::wait_events(self);
    }

    fn close_requested(&self) -> bool {
        WindowHost::close_requested(self)
    }
}
