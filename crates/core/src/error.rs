use thiserror::Error;

/// Failures outside the GPU device: windowing, surface creation and
/// configuration. Device-side code reports `swapframe_rhi::RhiError`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("window: {0}")]
    Window(String),

    /// The window system refused to hand out a Vulkan surface.
    #[error("surface: {0}")]
    Surface(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_layer() {
        let err = Error::Config("frames_in_flight must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: frames_in_flight must be at least 1"
        );
        assert!(Error::Surface("lost".into()).to_string().starts_with("surface"));
    }
}
