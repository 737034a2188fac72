//! Runtime configuration.
//!
//! [`Config`] holds the knobs shared by the window host, the Vulkan backend and
//! the frame driver. Defaults match a small resizable 800x600 window with two
//! frames in flight; every field can be overridden from the environment with
//! a `SWAPFRAME_*` variable through [`Config::from_env`].

use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Upper bound accepted for [`Config::frames_in_flight`].
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

const ENV_WIDTH: &str = "SWAPFRAME_WIDTH";
const ENV_HEIGHT: &str = "SWAPFRAME_HEIGHT";
const ENV_TITLE: &str = "SWAPFRAME_TITLE";
const ENV_FRAMES_IN_FLIGHT: &str = "SWAPFRAME_FRAMES_IN_FLIGHT";
const ENV_VSYNC: &str = "SWAPFRAME_VSYNC";
const ENV_VALIDATION: &str = "SWAPFRAME_VALIDATION";
const ENV_DEPTH: &str = "SWAPFRAME_DEPTH";
const ENV_FRAME_TIMEOUT_MS: &str = "SWAPFRAME_FRAME_TIMEOUT_MS";

/// Initial window parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    /// Initial inner width in physical pixels.
    pub width: u32,
    /// Initial inner height in physical pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "swapframe".to_string(),
        }
    }
}

/// Frame coordinator configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Initial window parameters.
    pub window: WindowConfig,
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Prefer a tear-free present mode.
    pub vsync: bool,
    /// Enable the Khronos validation layer and debug messenger.
    pub validation: bool,
    /// Attach a depth buffer to every drawable target.
    pub depth: bool,
    /// Upper bound for the per-frame gate wait and image acquisition.
    pub frame_timeout: Duration,
    /// Clear colour applied when a drawable target is begun.
    pub clear_color: [f32; 4],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            frames_in_flight: 2,
            vsync: true,
            validation: cfg!(debug_assertions),
            depth: false,
            frame_timeout: Duration::from_secs(1),
            clear_color: [0.5, 0.5, 0.5, 1.0],
        }
    }
}

impl Config {
    /// Build a configuration from defaults plus `SWAPFRAME_*` environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from defaults plus overrides supplied by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(width) = parse_var(&lookup, ENV_WIDTH)? {
            config.window.width = width;
        }
        if let Some(height) = parse_var(&lookup, ENV_HEIGHT)? {
            config.window.height = height;
        }
        if let Some(title) = lookup(ENV_TITLE) {
            config.window.title = title;
        }
        if let Some(frames) = parse_var(&lookup, ENV_FRAMES_IN_FLIGHT)? {
            config.frames_in_flight = frames;
        }
        if let Some(vsync) = parse_flag(&lookup, ENV_VSYNC)? {
            config.vsync = vsync;
        }
        if let Some(validation) = parse_flag(&lookup, ENV_VALIDATION)? {
            config.validation = validation;
        }
        if let Some(depth) = parse_flag(&lookup, ENV_DEPTH)? {
            config.depth = depth;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_FRAME_TIMEOUT_MS)? {
            config.frame_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the per-frame wait timeout.
    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Check that the configuration can drive a frame loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero or excessive frames in flight, a
    /// zero-area initial window, or a zero frame timeout.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(Error::Config(format!(
                "frames_in_flight must be within 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.frame_timeout.is_zero() {
            return Err(Error::Config("frame_timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            debug!("{key} overridden from the environment");
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .inspect(|_| debug!("{key} overridden from the environment"))
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Ok(true),
            "0" | "false" | "off" | "no" => Ok(false),
            _ => Err(Error::Config(format!("{key}={raw:?}: expected a boolean"))),
        })
        .transpose()
}
