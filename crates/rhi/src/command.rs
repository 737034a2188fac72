//! Command recording.
//!
//! Every frame slot owns one [`CommandBuffer`], all allocated from a single
//! [`CommandPool`] created with `RESET_COMMAND_BUFFER` so each slot can
//! rewind its own buffer without touching the others.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use swapframe_rhi::command::{CommandBuffer, CommandPool};
//! use swapframe_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, family: u32) -> Result<(), swapframe_rhi::RhiError> {
//! let pool = Arc::new(CommandPool::new(device, family)?);
//! let cmd = CommandBuffer::new(pool)?;
//!
//! cmd.restart()?;
//! // ... record ...
//! cmd.finish()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Command pool for one queue family.
pub struct CommandPool {
    device: Arc<Device>,
    handle: vk::CommandPool,
    family: u32,
}

impl CommandPool {
    pub fn new(device: Arc<Device>, family: u32) -> RhiResult<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        // SAFETY: `family` was validated during device creation.
        let handle = unsafe { device.handle().create_command_pool(&info, None)? };
        debug!("Command pool created for queue family {}", family);

        Ok(Self {
            device,
            handle,
            family,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // SAFETY: every `CommandBuffer` holds an `Arc` to the pool, so none
        // remain when this runs.
        unsafe { self.device.handle().destroy_command_pool(self.handle, None) };
        debug!("Command pool destroyed for queue family {}", self.family);
    }
}

/// Primary command buffer that frees itself back to its pool.
///
/// Recording takes `&self`. Vulkan requires a command buffer to be externally
/// synchronized, and each frame slot records its buffer from one thread.
pub struct CommandBuffer {
    pool: Arc<CommandPool>,
    handle: vk::CommandBuffer,
}

impl CommandBuffer {
    pub fn new(pool: Arc<CommandPool>) -> RhiResult<Self> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        // SAFETY: the pool is alive and owned by `pool`.
        let handle = unsafe { pool.device().handle().allocate_command_buffers(&info)? }
            .pop()
            .ok_or_else(|| RhiError::InvalidHandle("empty command buffer allocation".to_string()))?;

        Ok(Self { pool, handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    #[inline]
    fn raw(&self) -> &ash::Device {
        self.pool.device().handle()
    }

    /// Discard the previous recording and begin a new one-time submission.
    ///
    /// The buffer must not be pending execution; the slot's fence wait
    /// guarantees that.
    pub fn restart(&self) -> RhiResult<()> {
        let begin = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: see above.
        unsafe {
            self.raw()
                .reset_command_buffer(self.handle, vk::CommandBufferResetFlags::empty())?;
            self.raw().begin_command_buffer(self.handle, &begin)?;
        }
        Ok(())
    }

    pub fn finish(&self) -> RhiResult<()> {
        // SAFETY: recording was started by `restart`.
        unsafe { self.raw().end_command_buffer(self.handle)? };
        Ok(())
    }

    /// Begin `render_pass` on `framebuffer` over the whole `extent`, and point
    /// the dynamic viewport and scissor at the same area.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let area = scissor_for(extent);
        let begin = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(area)
            .clear_values(clear_values);

        // SAFETY: the buffer is recording and both handles are alive until
        // the submission retires.
        unsafe {
            let raw = self.raw();
            raw.cmd_begin_render_pass(self.handle, &begin, vk::SubpassContents::INLINE);
            raw.cmd_set_viewport(self.handle, 0, &[viewport_for(extent)]);
            raw.cmd_set_scissor(self.handle, 0, &[area]);
        }
    }

    pub fn end_render_pass(&self) {
        // SAFETY: paired with `begin_render_pass`.
        unsafe { self.raw().cmd_end_render_pass(self.handle) };
    }

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        // SAFETY: the pipeline outlives the submission.
        unsafe { self.raw().cmd_bind_pipeline(self.handle, bind_point, pipeline) };
    }

    pub fn bind_vertex_buffers(&self, first: u32, buffers: &[vk::Buffer], offsets: &[u64]) {
        // SAFETY: the buffers outlive the submission.
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(self.handle, first, buffers, offsets)
        };
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, offset: u64, index_type: vk::IndexType) {
        // SAFETY: the buffer outlives the submission.
        unsafe {
            self.raw()
                .cmd_bind_index_buffer(self.handle, buffer, offset, index_type)
        };
    }

    pub fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        // SAFETY: a pipeline and index buffer are bound by the caller.
        unsafe {
            self.raw().cmd_draw_indexed(
                self.handle,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        // SAFETY: the owning slot waited on its fence before dropping.
        unsafe {
            self.raw()
                .free_command_buffers(self.pool.handle(), &[self.handle])
        };
    }
}

fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport::default()
        .width(extent.width as f32)
        .height(extent.height as f32)
        .max_depth(1.0)
}

fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D::default().extent(extent)
}
