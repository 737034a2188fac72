//! Depth attachment shared by every framebuffer of one swapchain.
//!
//! Sharing is sound because frames rasterize one after another on the single
//! graphics queue.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::BoundMemory;

pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

pub struct DepthBuffer {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    // Dropped after `image` is destroyed.
    _memory: BoundMemory,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl DepthBuffer {
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] for an empty extent or a format without a
    /// depth aspect, otherwise whatever the driver or allocator reports.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "depth buffer of {}x{}",
                extent.width, extent.height
            )));
        }
        let aspect = depth_aspect(format)
            .ok_or_else(|| RhiError::InvalidHandle(format!("{:?} has no depth aspect", format)))?;

        // SAFETY: plain creation on a live device.
        let image = unsafe { device.handle().create_image(&image_info(extent, format), None)? };
        // SAFETY: nothing references the image on the error paths below.
        let destroy_image = |_: &RhiError| unsafe { device.handle().destroy_image(image, None) };

        let memory = BoundMemory::for_image(&device, image, "depth").inspect_err(destroy_image)?;
        let range = vk::ImageSubresourceRange::default()
            .aspect_mask(aspect)
            .level_count(1)
            .layer_count(1);
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(range);
        // SAFETY: `image` is bound to memory.
        let view = unsafe { device.handle().create_image_view(&view_info, None) }
            .map_err(RhiError::from)
            .inspect_err(destroy_image)?;

        info!(
            "Depth buffer created: {}x{} {:?}",
            extent.width, extent.height, format
        );
        Ok(Self {
            device,
            image,
            view,
            _memory: memory,
            format,
            extent,
        })
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        // SAFETY: the framebuffers using the view are destroyed first.
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }
        debug!("Depth buffer destroyed");
    }
}

fn image_info(extent: vk::Extent2D, format: vk::Format) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(extent.into())
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

/// Aspects a view of `format` must cover, or `None` for color formats.
fn depth_aspect(format: vk::Format) -> Option<vk::ImageAspectFlags> {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
            Some(vk::ImageAspectFlags::DEPTH)
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            Some(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL)
        }
        _ => None,
    }
}
