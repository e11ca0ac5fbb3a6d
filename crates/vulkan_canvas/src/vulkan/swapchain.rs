//! Vulkan swapchain management
//!
//! [`PresentationEngine`] is the seam the frame loop talks to: acquire an
//! image signaling a semaphore, present it waiting on another. Suboptimal and
//! out-of-date results are outcomes, not errors, so the caller can recreate
//! the swapchain and keep going.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};

use super::memory::color_subresource_range;
use super::{VulkanError, VulkanResult};

/// Result of asking for the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image index to render into
    Ready(u32),
    /// The swapchain no longer matches the surface exactly
    Suboptimal,
    /// The swapchain can no longer be used
    OutOfDate,
    /// Any other failure, including a timeout
    Failed(vk::Result),
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Queued normally
    Presented,
    /// Queued, but the swapchain should be recreated
    Suboptimal,
    /// Not queued, the swapchain must be recreated
    OutOfDate,
    /// Any other failure
    Failed(vk::Result),
}

/// Source of presentable images
pub trait PresentationEngine {
    /// Current image size
    fn extent(&self) -> vk::Extent2D;
    /// Image format
    fn format(&self) -> vk::Format;
    /// One view per swapchain image
    fn image_views(&self) -> &[vk::ImageView];
    /// Request the next image, signaling `signal` once it is ready for rendering
    fn acquire_next_image(&mut self, signal: vk::Semaphore, timeout_ns: u64) -> AcquireOutcome;
    /// Queue an image for presentation after `wait` is signaled
    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> PresentOutcome;
    /// Rebuild the images for the current surface state
    fn recreate(&mut self) -> VulkanResult<()>;
}

/// Surface-side inputs to swapchain creation
pub struct SurfaceContext {
    /// Instance the surface belongs to
    pub instance: Instance,
    /// Surface extension loader
    pub surface_loader: Surface,
    /// Window surface
    pub surface: vk::SurfaceKHR,
    /// Physical device rendering to the surface
    pub physical_device: vk::PhysicalDevice,
    /// Queue used for presentation
    pub present_queue: vk::Queue,
}

/// Swapchain management wrapper with RAII cleanup
pub struct AshSwapchain {
    device: Device,
    surface: SurfaceContext,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    window_extent: vk::Extent2D,
}

impl AshSwapchain {
    /// Create a new swapchain
    pub fn new(device: Device, surface: SurfaceContext, window_extent: vk::Extent2D) -> VulkanResult<Self> {
        let swapchain_loader = SwapchainLoader::new(&surface.instance, &device);

        let mut swapchain = Self {
            device,
            surface,
            swapchain_loader,
            swapchain: vk::SwapchainKHR::null(),
            image_views: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            extent: window_extent,
            window_extent,
        };
        swapchain.build()?;
        Ok(swapchain)
    }

    /// Window size used when the surface leaves the extent to the swapchain
    pub fn set_window_extent(&mut self, extent: vk::Extent2D) {
        self.window_extent = extent;
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Surface format in use
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    fn build(&mut self) -> VulkanResult<()> {
        let physical_device = self.surface.physical_device;
        let surface = self.surface.surface;
        let loader = &self.surface.surface_loader;

        let surface_caps = unsafe { loader.get_physical_device_surface_capabilities(physical_device, surface)? };
        let surface_formats = unsafe { loader.get_physical_device_surface_formats(physical_device, surface)? };
        let present_modes = unsafe { loader.get_physical_device_surface_present_modes(physical_device, surface)? };

        let format = surface_formats
            .iter()
            .find(|sf| sf.format == vk::Format::B8G8R8A8_UNORM && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .or_else(|| surface_formats.first())
            .copied()
            .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".into()))?;

        let present_mode = present_modes
            .iter()
            .copied()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        let extent = if surface_caps.current_extent.width == u32::MAX {
            vk::Extent2D {
                width: self
                    .window_extent
                    .width
                    .clamp(surface_caps.min_image_extent.width, surface_caps.max_image_extent.width),
                height: self
                    .window_extent
                    .height
                    .clamp(surface_caps.min_image_extent.height, surface_caps.max_image_extent.height),
            }
        } else {
            surface_caps.current_extent
        };

        let max_images = if surface_caps.max_image_count > 0 {
            surface_caps.max_image_count
        } else {
            u32::MAX
        };
        let image_count = (surface_caps.min_image_count + 1).min(max_images);

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };

        self.destroy_resources();
        self.swapchain = swapchain;
        self.format = format;
        self.extent = extent;

        let images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? };
        for image in images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .subresource_range(color_subresource_range());

            let view = unsafe { self.device.create_image_view(&view_info, None)? };
            self.image_views.push(view);
        }

        log::debug!(
            "Swapchain built: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            self.image_views.len(),
            format.format,
            present_mode
        );
        Ok(())
    }

    fn destroy_resources(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
        }
        self.swapchain = vk::SwapchainKHR::null();
    }
}

impl PresentationEngine for AshSwapchain {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn format(&self) -> vk::Format {
        self.format.format
    }

    fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore, timeout_ns: u64) -> AcquireOutcome {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, timeout_ns, signal, vk::Fence::null())
        };

        match result {
            Ok((index, false)) => AcquireOutcome::Ready(index),
            Ok((_, true)) | Err(vk::Result::SUBOPTIMAL_KHR) => AcquireOutcome::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => AcquireOutcome::OutOfDate,
            Err(err) => AcquireOutcome::Failed(err),
        }
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> PresentOutcome {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.surface.present_queue, &present_info)
        };

        match result {
            Ok(false) => PresentOutcome::Presented,
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => PresentOutcome::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentOutcome::OutOfDate,
            Err(err) => PresentOutcome::Failed(err),
        }
    }

    fn recreate(&mut self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle()? };
        self.build()
    }
}

impl Drop for AshSwapchain {
    fn drop(&mut self) {
        self.destroy_resources();
        unsafe {
            self.surface.surface_loader.destroy_surface(self.surface.surface, None);
        }
    }
}
