use thiserror::Error;

/// Failure of a Vulkan-facing operation.
///
/// Transient presentation states (out-of-date or suboptimal swapchain,
/// acquire timeout) are not represented here. Wrappers hand them back as raw
/// `vk::Result`s for the caller to classify.
#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan call failed: {0}")]
    VulkanError(#[from] ash::vk::Result),

    #[error("Vulkan loader unavailable: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("GPU memory allocation failed: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    #[error("no GPU can present to this surface")]
    NoSuitableGpu,

    #[error("shader: {0}")]
    ShaderError(String),

    #[error("swapchain: {0}")]
    SwapchainError(String),

    /// An object needed for the operation does not exist.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Render pass, framebuffer or pipeline construction.
    #[error("pipeline: {0}")]
    PipelineError(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
