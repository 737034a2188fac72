//! swapframe demo
//!
//! Renders an indexed, vertex-coloured quad through the frame driver in a
//! resizable window. Resize or minimize the window to exercise chain
//! recreation.
//!
//! Shaders are loaded as SPIR-V from `SWAPFRAME_SHADER_DIR` (default
//! `shaders/spirv`), compiled from the GLSL sources in `shaders/`:
//!
//! ```text
//! glslc shaders/quad.vert -o shaders/spirv/quad.vert.spv
//! glslc shaders/quad.frag -o shaders/spirv/quad.frag.spv
//! ```

mod vertex;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use tracing::info;

use swapframe::{FrameTarget, GpuContext, PipelineParams, VulkanContext, VulkanFrameDriver};
use swapframe_core::{Config, Timer};
use swapframe_platform::WindowHost;
use swapframe_rhi::RhiResult;
use swapframe_rhi::buffer::Buffer;
use swapframe_rhi::device::Device;
use swapframe_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use swapframe_rhi::shader::Shader;

use vertex::{QUAD_INDICES, QUAD_VERTICES, QuadVertex};

const ENV_SHADER_DIR: &str = "SWAPFRAME_SHADER_DIR";
const DEFAULT_SHADER_DIR: &str = "shaders/spirv";

/// Vertex and index buffers of the quad.
struct QuadGeometry {
    vertices: Buffer,
    indices: Buffer,
    index_count: u32,
}

impl QuadGeometry {
    fn upload(device: &Arc<Device>) -> RhiResult<Self> {
        let vertices = Buffer::vertex(device.clone(), bytemuck::cast_slice(&QUAD_VERTICES))?;
        let indices = Buffer::index(device.clone(), bytemuck::cast_slice(&QUAD_INDICES))?;

        Ok(Self {
            vertices,
            indices,
            index_count: QUAD_INDICES.len() as u32,
        })
    }

    fn draw(&self, frame: &FrameTarget<'_, VulkanContext>) {
        let Some(pipeline) = frame.pipeline else {
            return;
        };

        let cmd = frame.recording;
        cmd.bind_pipeline(pipeline.bind_point(), pipeline.handle());
        cmd.bind_vertex_buffers(0, &[self.vertices.handle()], &[0]);
        cmd.bind_index_buffer(self.indices.handle(), 0, vk::IndexType::UINT32);
        cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
    }
}

/// Builds the quad pipeline against whatever render pass the current chain
/// uses. Shader modules only live for the duration of the build.
fn quad_pipeline(
    shader_dir: PathBuf,
) -> impl FnMut(&VulkanContext, &PipelineParams<'_, VulkanContext>) -> RhiResult<Pipeline> {
    move |context: &VulkanContext, params: &PipelineParams<'_, VulkanContext>| {
        let device = context.device();
        let vertex_shader = Shader::load(
            device.clone(),
            &shader_dir.join("quad.vert.spv"),
            vk::ShaderStageFlags::VERTEX,
        )?;
        let fragment_shader = Shader::load(
            device.clone(),
            &shader_dir.join("quad.frag.spv"),
            vk::ShaderStageFlags::FRAGMENT,
        )?;
        let layout = PipelineLayout::new(device.clone(), &[], &[])?;
        let attributes = QuadVertex::attribute_descriptions();

        info!(
            "Building quad pipeline for {}x{}",
            params.extent.width, params.extent.height
        );

        GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(QuadVertex::binding_description())
            .vertex_attributes(&attributes)
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .cull_mode(vk::CullModeFlags::NONE)
            .depth_test(true, true)
            .render_pass(params.description)
            .build(device.clone(), layout)
    }
}

fn shader_dir() -> PathBuf {
    std::env::var_os(ENV_SHADER_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SHADER_DIR))
}

/// Pump window events and render until the window closes.
fn run(driver: &mut VulkanFrameDriver, geometry: &QuadGeometry) -> Result<()> {
    let mut timer = Timer::new();

    loop {
        driver.surface_mut().pump();
        if driver.surface().close_requested() {
            info!(
                "Close requested after {} presented frames",
                timer.total_frames()
            );
            return Ok(());
        }
        if driver.surface_mut().take_resized() {
            driver.notify_surface_resized();
        }

        let presented = driver.render_frame(|frame| geometry.draw(frame))?;
        if presented && let Some(fps) = timer.frame() {
            info!(
                "{:.1} fps ({} frames in flight, chain generation {})",
                fps,
                driver.frames_in_flight(),
                driver.generation()
            );
        }
    }
}

/// Drop `resources` once no submitted frame can still reference them.
fn release_after_idle<T>(wait_idle: impl FnOnce() -> RhiResult<()>, resources: T) -> RhiResult<()> {
    let idle = wait_idle();
    if idle.is_ok() {
        drop(resources);
    } else {
        // Destroying in-use buffers is undefined; leak them instead.
        std::mem::forget(resources);
    }
    idle
}

fn main() -> Result<()> {
    swapframe_core::init_logging();

    let config = Config::from_env().context("Invalid SWAPFRAME_* configuration")?;
    info!("Starting swapframe demo: {:?}", config);

    let host = WindowHost::new(&config.window)?;
    let context = VulkanContext::new(&host, &config)?;
    let mut driver = VulkanFrameDriver::initialize(context, host, config)?;
    driver
        .register_pipeline(quad_pipeline(shader_dir()))
        .context("Failed to build the quad pipeline")?;

    let geometry = QuadGeometry::upload(driver.context().device())?;
    let outcome = run(&mut driver, &geometry);

    // Submitted frames read the buffers until the device is idle, on the
    // error path too.
    release_after_idle(|| driver.context().wait_idle(), geometry)?;
    outcome?;
    driver.context().device().log_memory_report();

    driver.shutdown()?;
    info!("Shutdown complete");
    Ok(())
}
