//! Per-frame state machine.
//!
//! The [`FrameDriver`] ties the slot pool and the presentation chain together
//! and walks every frame through
//!
//! ```text
//! Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle
//! ```
//!
//! # Example
//!
//! ```no_run
//! use swapframe::{BeginFrame, VulkanContext, VulkanFrameDriver};
//! use swapframe_core::Config;
//! use swapframe_platform::WindowHost;
//!
//! # fn example() -> Result<(), swapframe::FrameError> {
//! let config = Config::from_env()?;
//! let host = WindowHost::new(&config.window)?;
//! let context = VulkanContext::new(&host, &config)?;
//! let mut driver = VulkanFrameDriver::initialize(context, host, config)?;
//!
//! while !driver.surface().close_requested() {
//!     driver.surface_mut().pump();
//!     if driver.surface_mut().take_resized() {
//!         driver.notify_surface_resized();
//!     }
//!
//!     if let BeginFrame::Ready(frame) = driver.begin_frame()? {
//!         // Record drawing commands into frame.recording...
//!         let _ = frame.recording;
//!         driver.end_frame()?;
//!     }
//! }
//!
//! driver.shutdown()?;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::{debug, error, info, warn};

use swapframe_core::Config;
use swapframe_rhi::RhiError;

use crate::backend::{Acquired, ChainInfo, GpuContext, PipelineFactory, SurfaceProvider, is_drawable};
use crate::error::{FrameError, FrameResult};
use crate::frame_slot::FrameSlotPool;
use crate::presentation::PresentationChain;

/// Where the driver is in the current cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// Everything the caller needs to record one frame.
pub struct FrameTarget<'a, C: GpuContext> {
    /// Open recording, already inside the drawable target.
    pub recording: &'a C::Recording,
    pub draw_target: &'a C::DrawTarget,
    /// `None` until a pipeline factory is registered.
    pub pipeline: Option<&'a C::Pipeline>,
    /// Frame cursor, in `0..frames_in_flight`.
    pub frame_index: usize,
    pub image_index: u32,
    pub extent: vk::Extent2D,
    /// Generation of the chain this frame renders into.
    pub generation: u64,
}

/// Result of [`FrameDriver::begin_frame`].
pub enum BeginFrame<'a, C: GpuContext> {
    /// No frame this cycle. The chain was recreated, the acquire timed out,
    /// or the surface is closing.
    Skipped,
    Ready(FrameTarget<'a, C>),
}

impl<'a, C: GpuContext> BeginFrame<'a, C> {
    #[inline]
    pub fn is_skipped(&self) -> bool {
        matches!(self, BeginFrame::Skipped)
    }
}

/// Drives acquire, record, submit and present for a fixed number of frames
/// in flight.
///
/// Fields drop in declaration order: slots and the chain go before the
/// context that created them.
pub struct FrameDriver<C: GpuContext, S: SurfaceProvider> {
    slots: FrameSlotPool<C>,
    presentation: PresentationChain<C>,
    context: C,
    surface: S,
    config: Config,
    frame_index: usize,
    phase: FramePhase,
    open_image: Option<u32>,
    resize_pending: bool,
    recreate_after_present: bool,
    shut_down: bool,
}

impl<C: GpuContext, S: SurfaceProvider> FrameDriver<C, S> {
    /// Build the presentation chain, its dependents and the slot pool.
    ///
    /// Blocks on window events while the surface has a zero extent.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Core`] for an invalid configuration,
    /// [`FrameError::SurfaceClosed`] if the surface closes before it becomes
    /// drawable, or the backend error of any failed creation.
    pub fn initialize(context: C, mut surface: S, config: Config) -> FrameResult<Self> {
        config.validate()?;

        let Some(extent) = wait_for_drawable_extent(&mut surface) else {
            return Err(FrameError::SurfaceClosed);
        };

        let presentation = PresentationChain::new(&context, extent)?;
        let slots = FrameSlotPool::new(&context, config.frames_in_flight)?;

        info!(
            frames_in_flight = slots.len(),
            "Frame driver initialized at {}x{}",
            extent.width,
            extent.height
        );

        Ok(Self {
            slots,
            presentation,
            context,
            surface,
            config,
            frame_index: 0,
            phase: FramePhase::Idle,
            open_image: None,
            resize_pending: false,
            recreate_after_present: false,
            shut_down: false,
        })
    }

    /// Builder form of [`register_pipeline`](Self::register_pipeline).
    pub fn with_pipeline<F>(mut self, factory: F) -> FrameResult<Self>
    where
        F: PipelineFactory<C> + 'static,
    {
        self.register_pipeline(factory)?;
        Ok(self)
    }

    /// Register the pipeline factory. The pipeline is built now and rebuilt
    /// after every recreation.
    ///
    /// # Panics
    ///
    /// Panics if a frame is open.
    pub fn register_pipeline<F>(&mut self, factory: F) -> FrameResult<()>
    where
        F: PipelineFactory<C> + 'static,
    {
        assert_eq!(
            self.phase,
            FramePhase::Idle,
            "register_pipeline called while a frame is open"
        );
        self.context.wait_idle()?;
        self.presentation.register_pipeline(&self.context, factory)?;
        Ok(())
    }

    /// Start a frame.
    ///
    /// On [`BeginFrame::Ready`] the recording is open inside the drawable
    /// target, cleared to the configured colour, and the caller must finish
    /// with [`end_frame`](Self::end_frame). On [`BeginFrame::Skipped`] the
    /// driver is idle again and the frame cursor did not move.
    ///
    /// # Panics
    ///
    /// Panics if the previous frame was not ended.
    pub fn begin_frame(&mut self) -> FrameResult<BeginFrame<'_, C>> {
        assert_eq!(
            self.phase,
            FramePhase::Idle,
            "begin_frame called while a frame is open"
        );

        let image_index = match self.acquire_for_frame() {
            Ok(Some(image_index)) => image_index,
            Ok(None) => {
                self.phase = FramePhase::Idle;
                return Ok(BeginFrame::Skipped);
            }
            Err(e) => {
                self.phase = FramePhase::Idle;
                return Err(e);
            }
        };

        let slot = self.slots.slot_for(self.frame_index);
        let dependents = self.presentation.dependents();
        let extent = self.presentation.extent();
        let (Some(description), Some(draw_target)) = (
            dependents.active_render_target_description(),
            dependents.draw_target(&self.context, image_index),
        ) else {
            self.phase = FramePhase::Idle;
            return Err(RhiError::InvalidHandle(format!(
                "no drawable target for image {image_index}"
            ))
            .into());
        };

        if let Err(e) = self.context.begin_recording(slot.recording()) {
            self.phase = FramePhase::Idle;
            return Err(e.into());
        }
        self.context.begin_target(
            slot.recording(),
            description,
            draw_target,
            extent,
            self.config.clear_color,
        );
        self.open_image = Some(image_index);
        self.phase = FramePhase::Recording;

        Ok(BeginFrame::Ready(FrameTarget {
            recording: slot.recording(),
            draw_target,
            pipeline: dependents.active_pipeline(),
            frame_index: self.frame_index,
            image_index,
            extent,
            generation: self.presentation.generation(),
        }))
    }

    /// Consume a pending resize, then acquire the next image. `None` means
    /// skip the cycle.
    fn acquire_for_frame(&mut self) -> FrameResult<Option<u32>> {
        if self.resize_pending && !self.recreate_from_surface()? {
            return Ok(None);
        }

        self.phase = FramePhase::Acquiring;
        let slot = self.slots.slot_for(self.frame_index);
        let acquired =
            self.presentation
                .acquire_next(&self.context, slot, self.config.frame_timeout)?;

        match acquired {
            Acquired::Ready(image_index) => Ok(Some(image_index)),
            Acquired::SuboptimalButUsable(image_index) => {
                self.recreate_after_present = true;
                Ok(Some(image_index))
            }
            Acquired::NeedsRecreate => {
                self.phase = FramePhase::Idle;
                self.recreate_from_surface()?;
                Ok(None)
            }
            Acquired::TimedOut => {
                warn!(frame = self.frame_index, "Skipping frame after acquire timeout");
                Ok(None)
            }
        }
    }

    /// Close, submit and present the open frame, then advance the cursor.
    ///
    /// Recreation requested by the surface, a stale present, or a suboptimal
    /// acquire runs here, after the present call.
    ///
    /// # Panics
    ///
    /// Panics unless a frame was begun with [`BeginFrame::Ready`].
    pub fn end_frame(&mut self) -> FrameResult<()> {
        assert_eq!(
            self.phase,
            FramePhase::Recording,
            "end_frame called without a successful begin_frame"
        );
        let Some(image_index) = self.open_image.take() else {
            panic!("end_frame called without an acquired image");
        };

        let slot = self.slots.slot_for(self.frame_index);
        self.context.end_target(slot.recording());
        self.context.end_recording(slot.recording())?;

        self.phase = FramePhase::Submitted;
        self.context.submit(
            slot.recording(),
            slot.acquire_signal(),
            slot.render_done_signal(),
            slot.gate(),
        )?;

        self.phase = FramePhase::Presenting;
        let presented = self.presentation.present(&self.context, slot, image_index)?;

        self.phase = FramePhase::Idle;
        self.frame_index = (self.frame_index + 1) % self.slots.len();

        if presented.wants_recreate() || self.recreate_after_present || self.resize_pending {
            self.recreate_from_surface()?;
        }
        Ok(())
    }

    /// Record drawing commands with `draw` between `begin_frame` and
    /// `end_frame`. Returns whether a frame was presented.
    pub fn render_frame<F>(&mut self, draw: F) -> FrameResult<bool>
    where
        F: FnOnce(&FrameTarget<'_, C>),
    {
        match self.begin_frame()? {
            BeginFrame::Skipped => return Ok(false),
            BeginFrame::Ready(frame) => draw(&frame),
        }
        self.end_frame()?;
        Ok(true)
    }

    /// Note that the surface changed size. Recreation happens at the next
    /// frame boundary, never inside an open frame.
    pub fn notify_surface_resized(&mut self) {
        if !self.resize_pending {
            debug!(phase = ?self.phase, "Surface resize noted");
        }
        self.resize_pending = true;
    }

    /// Recreate the chain now at the surface's current extent.
    ///
    /// Returns `false` if the surface closed while it was not drawable.
    ///
    /// # Panics
    ///
    /// Panics if a frame is open.
    pub fn recreate(&mut self) -> FrameResult<bool> {
        self.recreate_from_surface()
    }

    fn recreate_from_surface(&mut self) -> FrameResult<bool> {
        assert_eq!(
            self.phase,
            FramePhase::Idle,
            "presentation chain recreated while a frame is open"
        );

        let Some(extent) = wait_for_drawable_extent(&mut self.surface) else {
            debug!("Surface closed while waiting for a drawable extent");
            return Ok(false);
        };

        self.presentation.recreate(&self.context, extent)?;
        self.resize_pending = false;
        self.recreate_after_present = false;
        Ok(true)
    }

    /// Wait for the device to go idle, then release everything in reverse
    /// creation order.
    pub fn shutdown(mut self) -> FrameResult<()> {
        assert_ne!(
            self.phase,
            FramePhase::Recording,
            "shutdown called while a frame is open"
        );
        self.context.wait_idle()?;
        self.shut_down = true;
        info!("Frame driver shut down");
        Ok(())
    }

    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn chain_info(&self) -> ChainInfo {
        self.presentation.info()
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.presentation.generation()
    }

    #[inline]
    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    #[inline]
    pub fn presentation(&self) -> &PresentationChain<C> {
        &self.presentation
    }

    #[inline]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    #[inline]
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    #[inline]
    pub fn context(&self) -> &C {
        &self.context
    }
}

impl<C: GpuContext, S: SurfaceProvider> Drop for FrameDriver<C, S> {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }
        if let Err(e) = self.context.wait_idle() {
            error!("Failed to wait for device idle while dropping frame driver: {}", e);
        }
    }
}

/// Query the surface, blocking on events while it has no area. `None` if it
/// closed first.
fn wait_for_drawable_extent<S: SurfaceProvider>(surface: &mut S) -> Option<vk::Extent2D> {
    let mut logged = false;
    loop {
        if surface.close_requested() {
            return None;
        }
        let extent = surface.drawable_extent();
        if is_drawable(extent) {
            return Some(extent);
        }
        if !logged {
            debug!("Surface has zero extent, waiting for events");
            logged = true;
        }
        surface.wait_events();
    }
}
