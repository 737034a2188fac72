//! Allocator-backed memory bound to a single buffer or image.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::error;

use crate::device::Device;
use crate::error::RhiResult;

/// Returned to the device allocator on drop.
///
/// The owning wrapper must destroy its buffer or image before this is
/// dropped, which struct field order gives for free.
pub(crate) struct BoundMemory {
    device: Arc<Device>,
    allocation: ManuallyDrop<Allocation>,
    label: &'static str,
}

impl BoundMemory {
    /// Host-visible memory for `buffer`, persistently mapped.
    pub(crate) fn for_buffer(
        device: &Arc<Device>,
        buffer: vk::Buffer,
        label: &'static str,
    ) -> RhiResult<Self> {
        // SAFETY: `buffer` was created on `device` and has no memory yet.
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };
        let memory = Self::allocate(device, requirements, MemoryLocation::CpuToGpu, true, label)?;
        unsafe {
            device.handle().bind_buffer_memory(
                buffer,
                memory.allocation.memory(),
                memory.allocation.offset(),
            )?;
        }
        Ok(memory)
    }

    /// Device-local memory for an optimally tiled `image`.
    pub(crate) fn for_image(
        device: &Arc<Device>,
        image: vk::Image,
        label: &'static str,
    ) -> RhiResult<Self> {
        // SAFETY: `image` was created on `device` and has no memory yet.
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let memory = Self::allocate(device, requirements, MemoryLocation::GpuOnly, false, label)?;
        unsafe {
            device.handle().bind_image_memory(
                image,
                memory.allocation.memory(),
                memory.allocation.offset(),
            )?;
        }
        Ok(memory)
    }

    fn allocate(
        device: &Arc<Device>,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
        label: &'static str,
    ) -> RhiResult<Self> {
        let allocation = device.allocator()?.allocate(&AllocationCreateDesc {
            name: label,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        Ok(Self {
            device: device.clone(),
            allocation: ManuallyDrop::new(allocation),
            label,
        })
    }

    /// The mapped bytes, or `None` for device-local memory.
    pub(crate) fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        self.allocation.mapped_slice_mut()
    }
}

impl Drop for BoundMemory {
    fn drop(&mut self) {
        // SAFETY: `allocation` is never touched again.
        let allocation = unsafe { ManuallyDrop::take(&mut self.allocation) };
        let freed = self
            .device
            .allocator()
            .and_then(|mut allocator| Ok(allocator.free(allocation)?));
        if let Err(e) = freed {
            error!("Failed to free {} memory: {}", self.label, e);
        }
    }
}
