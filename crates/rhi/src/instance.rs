//! Vulkan instance, optional validation, and the debug messenger that
//! forwards validation output to `tracing` under the `vulkan` target.
//!
//! # Example
//!
//! ```no_run
//! use swapframe_rhi::instance::{Instance, InstanceDesc};
//!
//! # fn example() -> Result<(), swapframe_rhi::RhiError> {
//! // Surface extensions normally come from the window system.
//! let surface_extensions = [ash::khr::surface::NAME.as_ptr()];
//!
//! let instance = Instance::new(&InstanceDesc {
//!     application_name: c"demo",
//!     surface_extensions: &surface_extensions,
//!     enable_validation: cfg!(debug_assertions),
//! })?;
//! let _loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::RhiResult;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Copy, Debug)]
pub struct InstanceDesc<'a> {
    pub application_name: &'a CStr,
    /// Extensions the window system needs for surface creation.
    pub surface_extensions: &'a [*const c_char],
    /// Ask for the Khronos validation layer. Ignored with a warning when the
    /// layer is not installed.
    pub enable_validation: bool,
}

/// Loader entry plus `VkInstance`.
///
/// Must outlive every surface and device created from it.
pub struct Instance {
    entry: Entry,
    raw: ash::Instance,
    messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    pub fn new(desc: &InstanceDesc<'_>) -> RhiResult<Self> {
        // SAFETY: the loaded library stays alive inside `entry`.
        let entry = unsafe { Entry::load()? };

        let validation = desc.enable_validation && has_layer(&entry, VALIDATION_LAYER)?;
        if desc.enable_validation && !validation {
            warn!("{:?} is not installed, continuing without validation", VALIDATION_LAYER);
        }

        let version = vk::make_api_version(0, 0, 1, 0);
        let app_info = vk::ApplicationInfo::default()
            .application_name(desc.application_name)
            .application_version(version)
            .engine_name(c"swapframe")
            .engine_version(version)
            .api_version(vk::API_VERSION_1_1);
        let extensions = instance_extensions(desc.surface_extensions, validation);
        let layers: Vec<_> = validation
            .then_some(VALIDATION_LAYER.as_ptr())
            .into_iter()
            .collect();
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        // SAFETY: every pointer in `create_info` outlives the call.
        let raw = unsafe { entry.create_instance(&create_info, None)? };

        let messenger = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &raw);
            // SAFETY: `raw` was created with the debug utils extension.
            match unsafe { loader.create_debug_utils_messenger(&messenger_info(), None) } {
                Ok(handle) => Some((loader, handle)),
                Err(e) => {
                    // SAFETY: nothing else was created from `raw`.
                    unsafe { raw.destroy_instance(None) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        info!(
            extensions = extensions.len(),
            validation, "Vulkan instance created"
        );
        Ok(Self {
            entry,
            raw,
            messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.raw
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Validation messages are being forwarded.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: surfaces and devices hold no reference past their own drop,
        // and the owner drops them first.
        unsafe {
            if let Some((loader, handle)) = self.messenger.take() {
                loader.destroy_debug_utils_messenger(handle, None);
            }
            self.raw.destroy_instance(None);
        }
        debug!("Vulkan instance destroyed");
    }
}

fn has_layer(entry: &Entry, wanted: &CStr) -> RhiResult<bool> {
    // SAFETY: plain enumeration through a loaded entry.
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == wanted)))
}

fn instance_extensions(surface: &[*const c_char], debug_utils: bool) -> Vec<*const c_char> {
    let debug = debug_utils.then_some(ash::ext::debug_utils::NAME.as_ptr());
    surface.iter().copied().chain(debug).collect()
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    type Severity = vk::DebugUtilsMessageSeverityFlagsEXT;
    type Kind = vk::DebugUtilsMessageTypeFlagsEXT;

    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(Severity::WARNING | Severity::ERROR)
        .message_type(Kind::GENERAL | Kind::VALIDATION | Kind::PERFORMANCE)
        .pfn_user_callback(Some(forward_to_tracing))
}

unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: the layer passes either null or a valid callback struct whose
    // message is a NUL-terminated string.
    let message = unsafe { data.as_ref() }
        .filter(|data| !data.p_message.is_null())
        .map_or(Cow::Borrowed("<no message>"), |data| unsafe {
            CStr::from_ptr(data.p_message).to_string_lossy()
        });

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", ?kind, "{}", message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", ?kind, "{}", message);
    } else {
        debug!(target: "vulkan", ?kind, "{}", message);
    }

    // Never abort the call that triggered the message.
    vk::FALSE
}
