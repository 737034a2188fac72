//! SPIR-V shader modules.
//!
//! Modules are only needed while a pipeline is being compiled, so a
//! [`Shader`] is usually dropped right after `GraphicsPipelineBuilder::build`.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use ash::vk;
//! use swapframe_rhi::device::Device;
//! use swapframe_rhi::shader::Shader;
//!
//! # fn example(device: Arc<Device>) -> Result<(), swapframe_rhi::RhiError> {
//! let vertex = Shader::load(device, Path::new("shaders/spirv/quad.vert.spv"), vk::ShaderStageFlags::VERTEX)?;
//! let _stage = vertex.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Every module is entered through `main`.
pub const ENTRY_POINT: &CStr = c"main";

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader module for one pipeline stage.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}

impl Shader {
    /// Read a compiled SPIR-V file.
    ///
    /// # Errors
    ///
    /// [`RhiError::ShaderError`] if the file is unreadable or not SPIR-V.
    pub fn load(device: Arc<Device>, path: &Path, stage: vk::ShaderStageFlags) -> RhiResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| RhiError::ShaderError(format!("{}: {}", path.display(), e)))?;
        let shader = Self::from_bytes(device, &bytes, stage)?;
        debug!("Loaded {:?} shader from {}", stage, path.display());
        Ok(shader)
    }

    pub fn from_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: vk::ShaderStageFlags,
    ) -> RhiResult<Self> {
        let code = decode_spirv(bytes)?;
        let info = vk::ShaderModuleCreateInfo::default().code(&code);
        // SAFETY: `code` is well-formed SPIR-V words.
        let module = unsafe { device.handle().create_shader_module(&info, None)? };

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    /// Stage entry for `VkGraphicsPipelineCreateInfo`.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage)
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        // SAFETY: pipelines keep no reference to the module after creation.
        unsafe { self.device.handle().destroy_shader_module(self.module, None) };
    }
}

/// Bytes to aligned SPIR-V words. Byte-swapped modules are fixed up.
fn decode_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("malformed SPIR-V: {}", e)))?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(RhiError::ShaderError(format!(
            "not SPIR-V (magic {:#010x})",
            other
        ))),
        None => Err(RhiError::ShaderError("empty SPIR-V module".to_string())),
    }
}
