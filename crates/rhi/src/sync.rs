//! Fences and semaphores.
//!
//! A frame slot owns one [`Fence`] (GPU to CPU: the slot's last submission
//! retired) and two [`Semaphore`]s (GPU to GPU: image acquired, rendering
//! done).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use swapframe_rhi::device::Device;
//! use swapframe_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), swapframe_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//!
//! // Created signaled so the first wait returns immediately.
//! let in_flight = Fence::new(device, true)?;
//! if in_flight.wait(Duration::from_secs(1))? {
//!     in_flight.reset()?;
//! }
//! # let _ = image_available;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;

/// Binary semaphore, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    handle: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        // SAFETY: plain creation on a live device.
        let handle = unsafe {
            device
                .handle()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        Ok(Self { device, handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: no pending queue operation waits on or signals it.
        unsafe { self.device.handle().destroy_semaphore(self.handle, None) };
    }
}

/// Fence guarding one queue submission at a time.
///
/// Reset it just before the submission it will guard, and never while that
/// submission is pending.
pub struct Fence {
    device: Arc<Device>,
    handle: vk::Fence,
}

impl Fence {
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let mut flags = vk::FenceCreateFlags::empty();
        if signaled {
            flags |= vk::FenceCreateFlags::SIGNALED;
        }
        // SAFETY: plain creation on a live device.
        let handle = unsafe {
            device
                .handle()
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        };
        Ok(Self { device, handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Block for at most `timeout`.
    ///
    /// `Ok(false)` means the timeout expired first. Anything other than
    /// success or timeout, such as `ERROR_DEVICE_LOST`, is an error.
    pub fn wait(&self, timeout: Duration) -> RhiResult<bool> {
        // SAFETY: the fence belongs to this device.
        let result = unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.handle], true, timeout_ns(timeout))
        };
        match result {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn reset(&self) -> RhiResult<()> {
        // SAFETY: callers only reset a fence with no pending submission.
        unsafe { self.device.handle().reset_fences(&[self.handle])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: the owner waited for the guarded submission to retire.
        unsafe { self.device.handle().destroy_fence(self.handle, None) };
    }
}

/// Vulkan timeouts are `u64` nanoseconds; longer durations saturate to
/// "wait forever".
pub(crate) fn timeout_ns(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}
