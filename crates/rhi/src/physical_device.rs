//! Physical device (GPU) selection.
//!
//! A GPU is usable for presentation when it exposes a graphics queue family,
//! a queue family that can present to the target surface, the swapchain
//! extension, and at least one surface format and present mode. Among usable
//! GPUs the highest scoring one wins, with discrete GPUs strongly preferred.
//!
//! # Example
//!
//! ```no_run
//! # fn example(instance: &swapframe_rhi::instance::Instance, surface: ash::vk::SurfaceKHR)
//! # -> Result<(), swapframe_rhi::RhiError> {
//! use swapframe_rhi::physical_device::select_physical_device;
//!
//! let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let info = select_physical_device(instance.handle(), surface, &loader)?;
//! println!("Selected GPU: {}", info.device_name());
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;

use ash::vk;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SurfaceSupport;

/// Device extensions the coordinator cannot run without.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices used for rendering and presentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Choose families from `(index, flags, can_present)` triples.
    ///
    /// A single family doing both wins over the first graphics family paired
    /// with the first presenting one.
    pub fn pick(families: impl IntoIterator<Item = (u32, vk::QueueFlags, bool)>) -> Self {
        let mut picked = Self::default();

        for (index, flags, can_present) in families {
            let graphics = flags.contains(vk::QueueFlags::GRAPHICS);
            if graphics && can_present {
                return Self {
                    graphics_family: Some(index),
                    present_family: Some(index),
                };
            }
            if graphics {
                picked.graphics_family.get_or_insert(index);
            }
            if can_present {
                picked.present_family.get_or_insert(index);
            }
        }

        picked
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> = self.graphics_family.into_iter().collect();
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }

    /// Graphics and present live in different families, so chain images must
    /// be shared concurrently.
    #[inline]
    pub fn is_split(&self) -> bool {
        self.is_complete() && self.graphics_family != self.present_family
    }
}

/// Everything learned about the selected GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Driver-reported device name.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("<unnamed GPU>")
    }

    /// Total size of device-local heaps in bytes.
    pub fn device_local_memory(&self) -> u64 {
        let heaps = &self.memory_properties.memory_heaps;
        heaps[..self.memory_properties.memory_heap_count as usize]
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    fn score(&self) -> u64 {
        score(
            self.properties.device_type,
            self.device_local_memory(),
            self.queue_families.is_split(),
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.properties.device_type)
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Why a GPU was passed over.
#[derive(Debug, Error)]
enum Unsuitable {
    #[error("no graphics or no presenting queue family ({0:?})")]
    QueueFamilies(QueueFamilyIndices),

    #[error("missing device extensions {0:?}")]
    Extensions(Vec<&'static CStr>),

    #[error("surface offers no formats or present modes")]
    Surface,

    #[error("query failed: {0}")]
    Query(#[from] RhiError),
}

/// Pick the best GPU able to present to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when no enumerated GPU qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    // SAFETY: the instance is alive for the whole selection.
    let devices = unsafe { instance.enumerate_physical_devices()? };
    debug!("Enumerated {} GPU(s)", devices.len());

    let mut best: Option<(PhysicalDeviceInfo, u64)> = None;
    for device in devices {
        let info = match inspect(instance, device, surface, surface_loader) {
            Ok(info) => info,
            Err(reason) => {
                debug!("Skipping GPU {:?}: {}", device, reason);
                continue;
            }
        };

        let score = info.score();
        debug!("GPU '{}' scored {}", info.device_name(), score);
        if best.as_ref().is_none_or(|(_, top)| score > *top) {
            best = Some((info, score));
        }
    }

    let Some((info, score)) = best else {
        warn!("No GPU can present to the window surface");
        return Err(RhiError::NoSuitableGpu);
    };
    info!(
        "Selected GPU '{}' ({:?}, score {})",
        info.device_name(),
        info.properties.device_type,
        score
    );
    Ok(info)
}

fn inspect(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, Unsuitable> {
    // SAFETY: `device` came from this instance.
    let (properties, memory_properties, families, extensions) = unsafe {
        (
            instance.get_physical_device_properties(device),
            instance.get_physical_device_memory_properties(device),
            instance.get_physical_device_queue_family_properties(device),
            instance
                .enumerate_device_extension_properties(device)
                .map_err(RhiError::from)?,
        )
    };

    let queue_families = QueueFamilyIndices::pick(
        families
            .iter()
            .enumerate()
            .filter(|(_, family)| family.queue_count > 0)
            .map(|(index, family)| {
                let index = index as u32;
                // SAFETY: `index` is a valid family of `device`.
                let can_present = unsafe {
                    surface_loader.get_physical_device_surface_support(device, index, surface)
                }
                .unwrap_or(false);
                (index, family.queue_flags, can_present)
            }),
    );
    if !queue_families.is_complete() {
        return Err(Unsuitable::QueueFamilies(queue_families));
    }

    let missing = missing_extensions(&extensions);
    if !missing.is_empty() {
        return Err(Unsuitable::Extensions(missing));
    }

    if !SurfaceSupport::query(device, surface, surface_loader)?.is_usable() {
        return Err(Unsuitable::Surface);
    }

    Ok(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

fn missing_extensions(available: &[vk::ExtensionProperties]) -> Vec<&'static CStr> {
    let offered = |name: &CStr| {
        available
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext| ext == name))
    };
    REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .copied()
        .filter(|&name| !offered(name))
        .collect()
}

/// Device type dominates; local memory (capped at 16 GiB) and a shared
/// graphics/present family break ties.
fn score(device_type: vk::PhysicalDeviceType, local_memory: u64, split: bool) -> u64 {
    let base = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 100_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 10_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1_000,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };
    let memory_mib = (local_memory >> 20).min(16_384);
    let shared = if split { 0 } else { 500 };
    base + memory_mib + shared
}
