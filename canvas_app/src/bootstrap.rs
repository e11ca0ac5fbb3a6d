//! Vulkan instance, device and surface setup for the demo window

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Entry, Instance};
use std::ffi::{CStr, CString};
use std::rc::Rc;

use vulkan_canvas::vulkan::{AshDevice, AshSwapchain, DeviceRef, SurfaceContext, VulkanError, VulkanResult};

use crate::window::Window;

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    pub entry: Entry,
    pub instance: Instance,
}

impl VulkanInstance {
    /// Create an instance with the extensions the window needs
    pub fn new(window: &Window, app_name: &str) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}")))?;

        let app_name = CString::new(app_name)
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {e}")))?;
        let engine_name = c"vulkan_canvas";
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let extensions = required
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid extension name: {e}")))?;
        let extension_ptrs: Vec<*const std::ffi::c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None)? };
        Ok(Self { entry, instance })
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

/// GPU and queue family able to both render and present to the surface
struct SelectedGpu {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
}

fn select_gpu(instance: &Instance, surface_loader: &Surface, surface: vk::SurfaceKHR) -> VulkanResult<SelectedGpu> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    for physical_device in devices {
        let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                continue;
            }

            let presents = unsafe {
                surface_loader.get_physical_device_surface_support(physical_device, index, surface)?
            };
            if presents {
                let properties = unsafe { instance.get_physical_device_properties(physical_device) };
                log::info!("Selected GPU: {}", unsafe {
                    CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy()
                });
                return Ok(SelectedGpu { physical_device, queue_family: index });
            }
        }
    }

    Err(VulkanError::InitializationFailed("No GPU can both render and present".to_string()))
}

/// Device and presentation resources for the demo
///
/// Fields drop in order: the device before the instance it was created from.
pub struct GpuContext {
    device: Rc<AshDevice>,
    surface: Option<SurfaceContext>,
    instance: VulkanInstance,
}

impl GpuContext {
    pub fn new(window: &mut Window, app_name: &str) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, app_name)?;
        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let gpu = select_gpu(&instance.instance, &surface_loader, surface)?;

        let priorities = [1.0];
        let queue_info = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(gpu.queue_family)
            .queue_priorities(&priorities)
            .build()];
        let extensions = [SwapchainLoader::name().as_ptr()];
        let device_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_info)
            .enabled_extension_names(&extensions);

        let raw = unsafe { instance.instance.create_device(gpu.physical_device, &device_info, None)? };
        let device = Rc::new(AshDevice::new(&instance.instance, gpu.physical_device, raw, gpu.queue_family)?);

        let surface = SurfaceContext {
            instance: instance.instance.clone(),
            surface_loader,
            surface,
            physical_device: gpu.physical_device,
            present_queue: device.queue(),
        };

        Ok(Self { device, surface: Some(surface), instance })
    }

    /// The device behind the renderer's seam
    pub fn device(&self) -> DeviceRef {
        self.device.clone()
    }

    /// Build the swapchain; it takes ownership of the surface
    pub fn create_swapchain(&mut self, extent: vk::Extent2D) -> VulkanResult<AshSwapchain> {
        let surface = self
            .surface
            .take()
            .ok_or_else(|| VulkanError::invalid("The window surface already has a swapchain"))?;
        AshSwapchain::new(self.device.raw().clone(), surface, extent)
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        if let Some(surface) = self.surface.take() {
            unsafe { surface.surface_loader.destroy_surface(surface.surface, None) };
        }
        log::debug!("Releasing Vulkan instance {:?}", self.instance.instance.handle());
    }
}
