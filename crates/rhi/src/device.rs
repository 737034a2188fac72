//! Logical device, its queues and the GPU memory allocator.
//!
//! Every RAII wrapper in this crate holds an `Arc<Device>`, so the device is
//! destroyed only after the last object created from it. Dropping the device
//! waits for the GPU first.
//!
//! # Example
//!
//! ```no_run
//! # fn example(
//! #     instance: &swapframe_rhi::instance::Instance,
//! #     info: &swapframe_rhi::physical_device::PhysicalDeviceInfo,
//! # ) -> Result<(), swapframe_rhi::RhiError> {
//! use swapframe_rhi::device::Device;
//!
//! let device = Device::new(instance, info)?;
//! let _queue = device.present_queue();
//! device.wait_idle()?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};

/// Queue 0 of the graphics and present families. Both may be the same queue.
#[derive(Clone, Copy, Debug)]
struct Queues {
    graphics: vk::Queue,
    present: vk::Queue,
}

pub struct Device {
    raw: ash::Device,
    physical_device: vk::PhysicalDevice,
    // Released by hand in `Drop`, before `raw` is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    queues: Queues,
    families: QueueFamilyIndices,
}

impl Device {
    /// Create the logical device with the swapchain extension, one queue per
    /// distinct family, and a `gpu-allocator` instance.
    pub fn new(instance: &Instance, info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let families = info.queue_families;
        let (Some(graphics), Some(present)) = (families.graphics_family, families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let priority = [1.0f32];
        let queue_infos: Vec<_> = families
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priority)
            })
            .collect();
        let extensions: Vec<_> = REQUIRED_DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        // SAFETY: `info.device` was enumerated from `instance`.
        let raw = unsafe {
            instance
                .handle()
                .create_device(info.device, &create_info, None)?
        };
        // SAFETY: one queue was requested for each of these families.
        let queues = unsafe {
            Queues {
                graphics: raw.get_device_queue(graphics, 0),
                present: raw.get_device_queue(present, 0),
            }
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: raw.clone(),
            physical_device: info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .inspect_err(|_| {
            // SAFETY: nothing has been created from `raw` yet.
            unsafe { raw.destroy_device(None) }
        })?;

        info!(
            graphics_family = graphics,
            present_family = present,
            "Logical device created on '{}'",
            info.device_name()
        );
        Ok(Arc::new(Self {
            raw,
            physical_device: info.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queues,
            families,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.raw
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.queues.present
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.families
    }

    pub fn allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::LockPoisoned("gpu allocator"))
    }

    pub fn wait_idle(&self) -> RhiResult<()> {
        // SAFETY: callers never submit concurrently with this wait.
        unsafe { self.raw.device_wait_idle()? };
        Ok(())
    }

    /// Submit to the graphics queue, signalling `fence` on completion.
    ///
    /// # Safety
    ///
    /// Every handle in `submits` must be valid, and `fence` must be
    /// unsignaled with no pending submission.
    pub unsafe fn submit_graphics(
        &self,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        // SAFETY: upheld by the caller.
        unsafe { self.raw.queue_submit(self.queues.graphics, submits, fence)? };
        Ok(())
    }

    /// Log what `gpu-allocator` still holds.
    pub fn log_memory_report(&self) {
        let allocator = match self.allocator() {
            Ok(allocator) => allocator,
            Err(e) => {
                error!("GPU memory report unavailable: {}", e);
                return;
            }
        };
        let report = allocator.generate_report();
        info!(
            allocations = report.allocations.len(),
            blocks = report.blocks.len(),
            "GPU memory: {} of {} reserved bytes in use",
            report.total_allocated_bytes,
            report.total_reserved_bytes
        );
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: this is the last reference; nothing else can submit.
        unsafe {
            if let Err(e) = self.raw.device_wait_idle() {
                error!("Device idle wait failed during drop: {:?}", e);
            }
            // The allocator frees its blocks through `raw`.
            ManuallyDrop::drop(&mut self.allocator);
            self.raw.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// SAFETY: `ash::Device` is Send + Sync, queues and the physical device are
// plain handles, and the allocator is only reachable through its Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
