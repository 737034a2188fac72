//! Window hosting and Vulkan surface creation using winit.
//!
//! [`WindowHost`] owns the event loop and drives it by pumping instead of
//! handing control to `EventLoop::run_app`, so the frame loop stays on the
//! caller's stack. Events are folded into flags (`resized`, `close_requested`)
//! that the caller polls between frames.

use std::ffi::c_char;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

use swapframe_core::{Error, Result, WindowConfig};

/// Upper bound on pumps spent waiting for the platform to create the window.
const WINDOW_CREATION_PUMPS: usize = 100;

/// RAII wrapper for a Vulkan surface.
///
/// The instance that created the surface must outlive it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for surface capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle was created by `ash_window::create_surface` from the
        // same instance as the loader, and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}

/// Event state shared with winit's callbacks.
#[derive(Default)]
struct HostState {
    attributes: Option<WindowAttributes>,
    window: Option<Arc<Window>>,
    create_error: Option<String>,
    resized: bool,
    close_requested: bool,
}

impl ApplicationHandler for HostState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let Some(attributes) = self.attributes.take() else {
            return;
        };
        match event_loop.create_window(attributes) {
            Ok(window) => {
                let size = window.inner_size();
                info!("Window created: {}x{}", size.width, size.height);
                self.window = Some(Arc::new(window));
            }
            Err(e) => self.create_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                self.resized = true;
            }
            _ => {}
        }
    }
}

/// A winit window plus the event loop that feeds it.
pub struct WindowHost {
    // Declared before the event loop so the window is dropped first.
    state: HostState,
    event_loop: EventLoop<()>,
}

impl WindowHost {
    /// Create the event loop and a resizable window described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the event loop or window cannot be
    /// created.
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().map_err(|e| Error::Window(e.to_string()))?;

        let attributes = WindowAttributes::default()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let mut host = Self {
            state: HostState {
                attributes: Some(attributes),
                ..HostState::default()
            },
            event_loop,
        };

        // The window is created from the first `resumed` callback.
        for _ in 0..WINDOW_CREATION_PUMPS {
            host.pump();
            if let Some(e) = host.state.create_error.take() {
                return Err(Error::Window(e));
            }
            if host.state.window.is_some() {
                return Ok(host);
            }
            if host.state.close_requested {
                break;
            }
        }

        Err(Error::Window(
            "Event loop never resumed; no window was created".to_string(),
        ))
    }

    /// Process pending events without blocking.
    pub fn pump(&mut self) {
        self.event_loop.set_control_flow(ControlFlow::Poll);
        self.dispatch(Some(Duration::ZERO));
    }

    /// Block until at least one event arrives, then process it.
    pub fn wait_events(&mut self) {
        self.event_loop.set_control_flow(ControlFlow::Wait);
        self.dispatch(None);
    }

    fn dispatch(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            warn!("Event loop exited with code {}", code);
            self.state.close_requested = true;
        }
    }

    /// Whether a resize happened since the last call. Clears the flag.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }

    #[inline]
    pub fn close_requested(&self) -> bool {
        self.state.close_requested
    }

    /// Current drawable size in pixels; zero while minimized.
    pub fn drawable_extent(&self) -> vk::Extent2D {
        match self.state.window.as_deref() {
            Some(window) if window.is_minimized() != Some(true) => {
                let size = window.inner_size();
                vk::Extent2D {
                    width: size.width,
                    height: size.height,
                }
            }
            _ => vk::Extent2D::default(),
        }
    }

    #[inline]
    pub fn window(&self) -> Option<&Arc<Window>> {
        self.state.window.as_ref()
    }

    /// Instance extensions needed to create a surface on this display.
    ///
    /// The pointers refer to static strings owned by `ash-window`.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .event_loop
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| {
                Error::Surface(format!("Failed to enumerate surface extensions: {}", e))
            })?;

        debug!("{} instance extension(s) required for surfaces", extensions.len());
        Ok(extensions.to_vec())
    }

    /// Create a Vulkan surface for the window.
    ///
    /// `instance` must outlive the returned [`Surface`].
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let window = self
            .state
            .window
            .as_ref()
            .ok_or_else(|| Error::Window("No window to create a surface for".to_string()))?;

        let display_handle = window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: both handles come from a live winit window, and the surface is
        // destroyed in `Surface::drop` before the caller destroys `instance`.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Surface(format!("Failed to create Vulkan surface: {}", e)))?
        };

        info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }
}
