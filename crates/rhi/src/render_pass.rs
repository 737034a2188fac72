//! Presentation render pass and framebuffers.
//!
//! The render pass has a single subpass writing one color attachment that
//! ends in `PRESENT_SRC_KHR`, plus an optional depth attachment. Both are
//! cleared on load. Framebuffers bind a swapchain image view (and the shared
//! depth view) to the pass at one extent, so they are rebuilt whenever the
//! swapchain is.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Render pass targeting swapchain images.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
}

impl RenderPass {
    /// Create a pass whose color attachment has `color_format`, with a depth
    /// attachment of `depth_format` if given.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if creation fails.
    pub fn for_presentation(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: Option<vk::Format>,
    ) -> RhiResult<Self> {
        let attachments = attachment_descriptions(color_format, depth_format);

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if depth_format.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }
        let subpasses = [subpass];

        let dependencies = [external_dependency(depth_format.is_some())];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!(
            "Render pass created (color {:?}, depth {:?})",
            color_format, depth_format
        );

        Ok(Self {
            device,
            render_pass,
            color_format,
            depth_format,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn depth_format(&self) -> Option<vk::Format> {
        self.depth_format
    }

    /// Clear values matching the attachment order.
    pub fn clear_values(&self, clear_color: [f32; 4]) -> Vec<vk::ClearValue> {
        let mut values = vec![vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];
        if self.depth_format.is_some() {
            values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }
        values
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        info!("Render pass destroyed");
    }
}

/// VkFramebuffer for one swapchain image.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Bind `color_view` (and `depth_view`, if the pass has depth) to
    /// `render_pass` at `extent`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the depth view does not match
    /// the pass, or the Vulkan error if creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        color_view: vk::ImageView,
        depth_view: Option<vk::ImageView>,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        if render_pass.depth_format().is_some() != depth_view.is_some() {
            return Err(RhiError::InvalidHandle(
                "Framebuffer depth view does not match the render pass".to_string(),
            ));
        }

        let mut attachments = vec![color_view];
        attachments.extend(depth_view);

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
        debug!("Framebuffer created: {}x{}", extent.width, extent.height);

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
        debug!("Framebuffer destroyed");
    }
}

fn attachment_descriptions(
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
) -> Vec<vk::AttachmentDescription> {
    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let mut attachments = vec![color];
    if let Some(format) = depth_format {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
    }
    attachments
}

/// Makes the first subpass wait for the acquired image (and the previous
/// frame's depth writes) before writing attachments.
fn external_dependency(has_depth: bool) -> vk::SubpassDependency {
    let mut stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let mut access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    if has_depth {
        stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }

    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(if has_depth {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        } else {
            vk::AccessFlags::empty()
        })
        .dst_stage_mask(stages)
        .dst_access_mask(access)
}
