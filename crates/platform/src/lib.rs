//! Platform layer: a pumped winit window host and Vulkan surface creation.

mod window;

pub use window::{Surface, WindowHost};

pub use winit;
