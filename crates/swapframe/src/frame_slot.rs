//! Per-frame synchronization state.
//!
//! Each in-flight frame owns one [`FrameSlot`]:
//!
//! ```text
//! 1. wait gate          (CPU waits for the slot's previous submission)
//! 2. acquire image      (signals acquire_signal)
//! 3. record             (into recording)
//! 4. submit             (waits acquire_signal, signals render_done_signal + gate)
//! 5. present            (waits render_done_signal)
//! ```

use tracing::debug;

use crate::backend::GpuContext;
use crate::error::{FrameError, FrameResult};

/// Synchronization objects and recording handle for one in-flight frame.
pub struct FrameSlot<C: GpuContext> {
    recording: C::Recording,
    acquire_signal: C::Signal,
    render_done_signal: C::Signal,
    gate: C::Gate,
}

impl<C: GpuContext> FrameSlot<C> {
    fn new(context: &C) -> FrameResult<Self> {
        Ok(Self {
            recording: context.create_recording()?,
            acquire_signal: context.create_signal()?,
            render_done_signal: context.create_signal()?,
            // Signaled so the first use of the slot does not block.
            gate: context.create_gate(true)?,
        })
    }

    /// CPU-visible completion signal of the slot's last submission.
    #[inline]
    pub fn gate(&self) -> &C::Gate {
        &self.gate
    }

    #[inline]
    pub fn acquire_signal(&self) -> &C::Signal {
        &self.acquire_signal
    }

    #[inline]
    pub fn render_done_signal(&self) -> &C::Signal {
        &self.render_done_signal
    }

    #[inline]
    pub fn recording(&self) -> &C::Recording {
        &self.recording
    }
}

/// Fixed set of frame slots indexed by the frame cursor.
pub struct FrameSlotPool<C: GpuContext> {
    slots: Vec<FrameSlot<C>>,
}

impl<C: GpuContext> FrameSlotPool<C> {
    /// Allocate `count` slots.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Config`] for a zero count, or the backend error
    /// if any object cannot be created.
    pub fn new(context: &C, count: usize) -> FrameResult<Self> {
        if count == 0 {
            return Err(FrameError::Config(
                "at least one frame slot is required".to_string(),
            ));
        }

        let slots = (0..count)
            .map(|_| FrameSlot::new(context))
            .collect::<FrameResult<Vec<_>>>()?;

        debug!("Created {} frame slot(s)", count);
        Ok(Self { slots })
    }

    /// Slot for `cursor`, wrapping modulo the pool size.
    #[inline]
    pub fn slot_for(&self, cursor: usize) -> &FrameSlot<C> {
        &self.slots[cursor % self.slots.len()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`; a pool has at least one slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
