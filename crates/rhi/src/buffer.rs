//! Host-visible geometry buffers.
//!
//! Geometry is written once through the persistent mapping and afterwards
//! only read by the GPU, so there is no staging copy.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use swapframe_rhi::buffer::Buffer;
//! use swapframe_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), swapframe_rhi::RhiError> {
//! let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
//! let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
//! let index_buffer = Buffer::index(device, &bytes)?;
//! assert_eq!(index_buffer.size(), 24);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::BoundMemory;

pub struct Buffer {
    device: Arc<Device>,
    handle: vk::Buffer,
    // Dropped after `handle` is destroyed.
    memory: BoundMemory,
    size: vk::DeviceSize,
    label: &'static str,
}

impl Buffer {
    /// Vertex buffer holding a copy of `data`.
    pub fn vertex(device: Arc<Device>, data: &[u8]) -> RhiResult<Self> {
        Self::with_contents(device, vk::BufferUsageFlags::VERTEX_BUFFER, "vertex", data)
    }

    /// Index buffer holding a copy of `data`.
    pub fn index(device: Arc<Device>, data: &[u8]) -> RhiResult<Self> {
        Self::with_contents(device, vk::BufferUsageFlags::INDEX_BUFFER, "index", data)
    }

    fn with_contents(
        device: Arc<Device>,
        usage: vk::BufferUsageFlags,
        label: &'static str,
        data: &[u8],
    ) -> RhiResult<Self> {
        let mut buffer = Self::new(device, usage, label, data.len() as vk::DeviceSize)?;
        buffer.write(0, data)?;
        Ok(buffer)
    }

    /// Uninitialized mapped buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] for a zero size, otherwise whatever the
    /// driver or allocator reports.
    pub fn new(
        device: Arc<Device>,
        usage: vk::BufferUsageFlags,
        label: &'static str,
        size: vk::DeviceSize,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!("{} buffer of 0 bytes", label)));
        }

        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        // SAFETY: plain creation on a live device.
        let handle = unsafe { device.handle().create_buffer(&info, None)? };
        let memory = BoundMemory::for_buffer(&device, handle, label).inspect_err(|_| {
            // SAFETY: nothing references the buffer yet.
            unsafe { device.handle().destroy_buffer(handle, None) }
        })?;

        debug!("{} buffer created: {} bytes", label, size);
        Ok(Self {
            device,
            handle,
            memory,
            size,
            label,
        })
    }

    /// Copy `data` to byte `offset`. The GPU must not be reading that range.
    pub fn write(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        let range = write_range(self.size, offset, data.len()).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "{} bytes at offset {} overflow a {} byte {} buffer",
                data.len(),
                offset,
                self.size,
                self.label
            ))
        })?;
        let mapped = self
            .memory
            .mapped_mut()
            .ok_or_else(|| RhiError::InvalidHandle(format!("{} buffer is not mapped", self.label)))?;

        // The allocation may be larger than the buffer, never smaller.
        mapped[range].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // SAFETY: the owner retires every submission that reads the buffer
        // before dropping it.
        unsafe { self.device.handle().destroy_buffer(self.handle, None) };
        debug!("{} buffer destroyed", self.label);
    }
}

/// Byte range of a write, if it fits inside `size`.
fn write_range(
    size: vk::DeviceSize,
    offset: vk::DeviceSize,
    len: usize,
) -> Option<std::ops::Range<usize>> {
    let end = offset.checked_add(len as vk::DeviceSize)?;
    (end <= size).then(|| offset as usize..end as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_range() {
        assert_eq!(write_range(16, 0, 16), Some(0..16));
        assert_eq!(write_range(16, 8, 8), Some(8..16));
        assert_eq!(write_range(16, 16, 0), Some(16..16));
        assert_eq!(write_range(16, 8, 9), None);
        assert_eq!(write_range(16, u64::MAX, 1), None);
    }
}
