//! Swapchain management.
//!
//! A [`Swapchain`] is immutable once created: extent, format and image count
//! are fixed for its lifetime. Resizing creates a successor with
//! [`Swapchain::new`], passing the current swapchain as `previous` so the
//! driver can recycle its resources, then drops the old one.
//!
//! Creation is split in two steps. [`SurfaceSupport::query`] asks the driver
//! what the surface can do, and [`SwapchainConfig::negotiate`] turns that and
//! a [`SwapchainDesc`] into concrete parameters. The second step is pure and
//! is where every selection rule lives.
//!
//! # Example
//!
//! ```no_run
//! # fn example(
//! #     instance: &swapframe_rhi::instance::Instance,
//! #     device: std::sync::Arc<swapframe_rhi::device::Device>,
//! #     surface: ash::vk::SurfaceKHR,
//! #     semaphore: ash::vk::Semaphore,
//! # ) -> Result<(), swapframe_rhi::RhiError> {
//! use ash::vk;
//! use swapframe_rhi::swapchain::{Swapchain, SwapchainDesc};
//!
//! let desc = SwapchainDesc {
//!     extent: vk::Extent2D { width: 800, height: 600 },
//!     vsync: true,
//! };
//! let swapchain = Swapchain::new(instance, device.clone(), surface, &desc, None)?;
//!
//! // After a resize:
//! let desc = SwapchainDesc { extent: vk::Extent2D { width: 1024, height: 768 }, ..desc };
//! device.wait_idle()?;
//! let swapchain = Swapchain::new(instance, device, surface, &desc, Some(&swapchain))?;
//! let _ = swapchain.acquire_next_image(semaphore, std::time::Duration::MAX);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::sync::timeout_ns;

/// `current_extent` takes this value when the window manager lets the
/// swapchain pick its own size.
const EXTENT_FROM_SWAPCHAIN: u32 = u32::MAX;

/// What a surface offers on one GPU.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        // SAFETY: both handles are alive for the duration of the queries.
        let (capabilities, formats, present_modes) = unsafe {
            (
                loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                loader.get_physical_device_surface_formats(physical_device, surface)?,
                loader.get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// A swapchain can be built from this surface at all.
    #[inline]
    pub fn is_usable(&self) -> bool {
        !(self.formats.is_empty() || self.present_modes.is_empty())
    }
}

/// Requested swapchain parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    /// Desired extent; the surface may override or clamp it.
    pub extent: vk::Extent2D,
    /// Prefer a tear-free present mode.
    pub vsync: bool,
}

/// Concrete swapchain parameters agreed between a [`SwapchainDesc`] and a
/// [`SurfaceSupport`].
#[derive(Clone, Copy, Debug)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    /// Pick format, present mode, extent and image count.
    ///
    /// # Errors
    ///
    /// [`RhiError::SwapchainError`] if the surface offers no format or no
    /// present mode, or if the resulting extent has a zero side (a minimized
    /// window).
    pub fn negotiate(support: &SurfaceSupport, desc: &SwapchainDesc) -> RhiResult<Self> {
        if !support.is_usable() {
            return Err(RhiError::SwapchainError(format!(
                "surface offers {} formats and {} present modes",
                support.formats.len(),
                support.present_modes.len()
            )));
        }

        let caps = &support.capabilities;
        let extent = if caps.current_extent.width == EXTENT_FROM_SWAPCHAIN {
            vk::Extent2D {
                width: desc
                    .extent
                    .width
                    .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: desc
                    .extent
                    .height
                    .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        } else {
            caps.current_extent
        };
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "surface extent {}x{} has no drawable area",
                extent.width, extent.height
            )));
        }

        // One image beyond the minimum so acquire rarely waits on the
        // presentation engine. Zero max means unbounded.
        let mut min_image_count = caps.min_image_count + 1;
        if caps.max_image_count != 0 {
            min_image_count = min_image_count.min(caps.max_image_count);
        }

        Ok(Self {
            surface_format: pick_surface_format(&support.formats),
            present_mode: pick_present_mode(&support.present_modes, desc.vsync),
            extent,
            min_image_count,
            transform: caps.current_transform,
        })
    }
}

fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    const RANKED: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM];

    for (rank, format) in RANKED.into_iter().enumerate() {
        let found = formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR);
        if let Some(&found) = found {
            if rank > 0 {
                warn!("sRGB swapchain format unavailable, using {:?}", format);
            }
            return found;
        }
    }

    let fallback = formats.first().copied().unwrap_or_default();
    warn!(
        "No preferred swapchain format, using {:?} / {:?}",
        fallback.format, fallback.color_space
    );
    fallback
}

fn pick_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    use vk::PresentModeKHR as Mode;

    let ranked: &[Mode] = if vsync {
        &[Mode::MAILBOX]
    } else {
        &[Mode::IMMEDIATE, Mode::MAILBOX]
    };

    // FIFO is the one mode every implementation must support.
    ranked
        .iter()
        .find(|mode| available.contains(mode))
        .copied()
        .unwrap_or(Mode::FIFO)
}

/// Vulkan swapchain with its images and colour views.
pub struct Swapchain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    config: SwapchainConfig,
}

impl Swapchain {
    /// Create a swapchain for `surface`.
    ///
    /// `previous`, when given, is passed as `oldSwapchain`. The caller keeps
    /// ownership of it and must drop it after this call returns, once no
    /// GPU work references its images.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        desc: &SwapchainDesc,
        previous: Option<&Swapchain>,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let support = SurfaceSupport::query(device.physical_device(), surface, &surface_loader)?;
        debug!(
            "Surface support: {} formats, {} present modes, {}..{} images",
            support.formats.len(),
            support.present_modes.len(),
            support.capabilities.min_image_count,
            support.capabilities.max_image_count
        );
        let config = SwapchainConfig::negotiate(&support, desc)?;

        let families = device.queue_families();
        let family_indices = families.unique_families();
        let (sharing_mode, shared): (_, &[u32]) = if families.is_split() {
            (vk::SharingMode::CONCURRENT, &family_indices)
        } else {
            (vk::SharingMode::EXCLUSIVE, &[])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(config.min_image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared)
            .pre_transform(config.transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(previous.map_or(vk::SwapchainKHR::null(), |p| p.handle));

        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        // SAFETY: the surface outlives the swapchain; `previous` is still alive.
        let handle = unsafe { loader.create_swapchain(&create_info, None)? };

        // Owned from here so an early return destroys what was created.
        let mut swapchain = Self {
            device,
            loader,
            handle,
            images: Vec::new(),
            views: Vec::new(),
            config,
        };
        // SAFETY: `handle` was just created by this loader.
        swapchain.images = unsafe { swapchain.loader.get_swapchain_images(handle)? };
        for &image in &swapchain.images {
            let view = color_view(&swapchain.device, image, config.surface_format.format)?;
            swapchain.views.push(view);
        }

        info!(
            "Swapchain ready: {}x{} {:?} {:?}, {} images{}",
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.present_mode,
            swapchain.images.len(),
            if previous.is_some() { ", replaced previous" } else { "" }
        );
        Ok(swapchain)
    }

    /// Request the next presentable image.
    ///
    /// Returns the image index and whether the swapchain is suboptimal.
    /// `ERROR_OUT_OF_DATE_KHR`, `TIMEOUT` and `NOT_READY` come back as `Err`
    /// for the caller to classify.
    pub fn acquire_next_image(
        &self,
        signal: vk::Semaphore,
        timeout: Duration,
    ) -> Result<(u32, bool), vk::Result> {
        // SAFETY: the semaphore is unsignaled with no pending signal operation;
        // the frame slot protocol guarantees that.
        unsafe {
            self.loader
                .acquire_next_image(self.handle, timeout_ns(timeout), signal, vk::Fence::null())
        }
    }

    /// Queue `image_index` for presentation once `wait` signals.
    ///
    /// `Ok(true)` means the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let waits = [wait];
        let swapchains = [self.handle];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);

        // SAFETY: `image_index` was returned by `acquire_next_image` on this
        // swapchain and the queue supports presentation.
        unsafe { self.loader.queue_present(queue, &info) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.config.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    /// Images the driver actually created, which may exceed the requested
    /// minimum.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let device = self.device.handle();
        // SAFETY: the owner waited for the device to go idle before dropping.
        unsafe {
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
        debug!(
            "Swapchain destroyed ({}x{})",
            self.config.extent.width, self.config.extent.height
        );
    }
}

fn color_view(device: &Device, image: vk::Image, format: vk::Format) -> RhiResult<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .level_count(1)
                .layer_count(1),
        );

    // SAFETY: `image` belongs to a live swapchain on this device.
    unsafe { device.handle().create_image_view(&info, None) }
        .map_err(|e| RhiError::SwapchainError(format!("swapchain image view: {:?}", e)))
}
