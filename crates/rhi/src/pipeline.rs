//! Graphics pipelines bound to a render pass.
//!
//! A [`Pipeline`] is compiled against one [`RenderPass`], so it belongs to
//! the same rebuild group as the render pass and must be recreated with it.
//! Viewport and scissor are dynamic and never baked into the pipeline.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use swapframe_rhi::device::Device;
//! use swapframe_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//! use swapframe_rhi::render_pass::RenderPass;
//! use swapframe_rhi::shader::Shader;
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     render_pass: &RenderPass,
//! #     vertex_shader: &Shader,
//! #     fragment_shader: &Shader,
//! # ) -> Result<(), swapframe_rhi::RhiError> {
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(vertex_shader)
//!     .fragment_shader(fragment_shader)
//!     .cull_mode(vk::CullModeFlags::NONE)
//!     .render_pass(render_pass)
//!     .build(device, layout)?;
//! # let _ = pipeline;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::Shader;

/// Owned `VkPipelineLayout`.
pub struct PipelineLayout {
    device: Arc<Device>,
    handle: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Both slices may be empty.
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constants);
        // SAFETY: the slices outlive the call.
        let handle = unsafe { device.handle().create_pipeline_layout(&info, None)? };
        Ok(Self { device, handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        // SAFETY: the pipeline built from this layout is dropped first.
        unsafe { self.device.handle().destroy_pipeline_layout(self.handle, None) };
    }
}

/// Graphics pipeline together with the layout it was built from.
pub struct Pipeline {
    device: Arc<Device>,
    handle: vk::Pipeline,
    // Dropped after `handle` is destroyed.
    layout: PipelineLayout,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        vk::PipelineBindPoint::GRAPHICS
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // SAFETY: callers drop pipelines only once the device is idle.
        unsafe { self.device.handle().destroy_pipeline(self.handle, None) };
        debug!("Graphics pipeline destroyed");
    }
}

/// Rasterizer settings the builder exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Raster {
    topology: vk::PrimitiveTopology,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth_test: bool,
    depth_write: bool,
}

impl Default for Raster {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
        }
    }
}

impl Raster {
    /// Depth state for a render pass with or without a depth attachment.
    /// Without one, depth is disabled whatever was requested.
    fn depth_stencil(&self, pass_has_depth: bool) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(pass_has_depth && self.depth_test)
            .depth_write_enable(pass_has_depth && self.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .max_depth_bounds(1.0)
    }
}

/// Builds a graphics pipeline for subpass 0 of a render pass.
///
/// Defaults to filled triangle lists, back-face culling with
/// counter-clockwise front faces, no blending, and `LESS` depth testing when
/// the render pass has depth.
#[derive(Default)]
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
    raster: Raster,
    render_pass: Option<&'a RenderPass>,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.attributes.extend_from_slice(attributes);
        self
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.raster.topology = topology;
        self
    }

    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.raster.cull_mode = cull_mode;
        self
    }

    pub fn front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.raster.front_face = front_face;
        self
    }

    /// Ignored when the render pass has no depth attachment.
    pub fn depth_test(mut self, test: bool, write: bool) -> Self {
        self.raster.depth_test = test;
        self.raster.depth_write = write;
        self
    }

    pub fn render_pass(mut self, render_pass: &'a RenderPass) -> Self {
        self.render_pass = Some(render_pass);
        self
    }

    /// Compile the pipeline. It takes ownership of `layout`.
    ///
    /// # Errors
    ///
    /// [`RhiError::PipelineError`] if either shader or the render pass was not
    /// set; otherwise whatever the driver reports.
    pub fn build(self, device: Arc<Device>, layout: PipelineLayout) -> RhiResult<Pipeline> {
        let missing = |what: &str| RhiError::PipelineError(format!("{} not set", what));
        let vertex = self.vertex_shader.ok_or_else(|| missing("vertex shader"))?;
        let fragment = self.fragment_shader.ok_or_else(|| missing("fragment shader"))?;
        let render_pass = self.render_pass.ok_or_else(|| missing("render pass"))?;

        let stages = [vertex.stage_create_info(), fragment.stage_create_info()];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes);
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(self.raster.topology);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(self.raster.cull_mode)
            .front_face(self.raster.front_face)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = self.raster.depth_stencil(render_pass.depth_format().is_some());
        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&blend)
            .dynamic_state(&dynamic)
            .layout(layout.handle())
            .render_pass(render_pass.handle());

        // SAFETY: every state struct referenced by `info` lives until the call
        // returns.
        let created = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        };
        let handle = match created {
            Ok(pipelines) => pipelines.first().copied(),
            Err((_, result)) => return Err(result.into()),
        }
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        debug!(
            "Graphics pipeline built for {:?} (depth {:?})",
            render_pass.color_format(),
            render_pass.depth_format()
        );
        Ok(Pipeline {
            device,
            handle,
            layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert!(builder.vertex_shader.is_none());
        assert!(builder.render_pass.is_none());
        assert_eq!(builder.raster, Raster::default());
        assert_eq!(builder.raster.cull_mode, vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_builder_collects_vertex_layout_and_raster_state() {
        let builder = GraphicsPipelineBuilder::new()
            .vertex_binding(vk::VertexInputBindingDescription::default().stride(20))
            .vertex_attributes(&[
                vk::VertexInputAttributeDescription::default().location(0),
                vk::VertexInputAttributeDescription::default().location(1),
            ])
            .topology(vk::PrimitiveTopology::TRIANGLE_STRIP)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE);

        assert_eq!(builder.bindings.len(), 1);
        assert_eq!(builder.bindings[0].stride, 20);
        assert_eq!(builder.attributes.len(), 2);
        assert_eq!(builder.raster.topology, vk::PrimitiveTopology::TRIANGLE_STRIP);
        assert_eq!(builder.raster.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(builder.raster.front_face, vk::FrontFace::CLOCKWISE);
    }

    #[test]
    fn test_depth_disabled_without_depth_attachment() {
        let raster = Raster::default();

        let with_depth = raster.depth_stencil(true);
        assert_eq!(with_depth.depth_test_enable, vk::TRUE);
        assert_eq!(with_depth.depth_write_enable, vk::TRUE);
        assert_eq!(with_depth.depth_compare_op, vk::CompareOp::LESS);

        let without = raster.depth_stencil(false);
        assert_eq!(without.depth_test_enable, vk::FALSE);
        assert_eq!(without.depth_write_enable, vk::FALSE);
    }

    #[test]
    fn test_depth_test_without_write() {
        let raster = Raster {
            depth_write: false,
            ..Raster::default()
        };
        let state = raster.depth_stencil(true);
        assert_eq!(state.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_write_enable, vk::FALSE);
    }
}
