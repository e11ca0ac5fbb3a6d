//! 2D images bound to a pool lease

use ash::vk;
use std::cell::Cell;

use super::pool::{bind_lease, release_lease};
use super::{MemoryRange, PoolRef};
use crate::vulkan::{DeviceRef, VulkanError, VulkanResult};

/// Image creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCreateInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: vk::Format,
    /// Image usage
    pub usage: vk::ImageUsageFlags,
    /// Required memory properties
    pub properties: vk::MemoryPropertyFlags,
}

impl ImageCreateInfo {
    /// Image with no usage flags yet
    pub fn new(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            usage: vk::ImageUsageFlags::empty(),
            properties: vk::MemoryPropertyFlags::empty(),
        }
    }

    /// Usable as colour attachment
    #[must_use]
    pub fn color_attachment(mut self) -> Self {
        self.usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        self
    }

    /// Usable from shaders through a sampler
    #[must_use]
    pub fn sampled(mut self) -> Self {
        self.usage |= vk::ImageUsageFlags::SAMPLED;
        self
    }

    /// Usable as copy source
    #[must_use]
    pub fn transfer_src(mut self) -> Self {
        self.usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        self
    }

    /// Usable as copy destination
    #[must_use]
    pub fn transfer_dst(mut self) -> Self {
        self.usage |= vk::ImageUsageFlags::TRANSFER_DST;
        self
    }

    /// Device local memory
    #[must_use]
    pub fn device_local(mut self) -> Self {
        self.properties |= vk::MemoryPropertyFlags::DEVICE_LOCAL;
        self
    }

    /// Extent of the image
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D { width: self.width, height: self.height }
    }
}

/// An image and its colour view, holding one memory lease for its lifetime
///
/// The layout last recorded for the image is tracked so transfers can pick
/// the right barrier.
pub struct MemoryImage {
    device: DeviceRef,
    pool: PoolRef,
    image: vk::Image,
    view: vk::ImageView,
    extent: vk::Extent2D,
    format: vk::Format,
    layout: Cell<vk::ImageLayout>,
    range: MemoryRange,
    defragment_on_release: bool,
}

impl MemoryImage {
    /// Create an optimal-tiling 2D image, bind it to a lease and create its view
    pub fn new(pool: &PoolRef, info: &ImageCreateInfo) -> VulkanResult<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(VulkanError::invalid(format!(
                "Cannot create an empty {}x{} image",
                info.width, info.height
            )));
        }

        let device = pool.borrow().device().clone();

        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(info.format)
            .extent(vk::Extent3D { width: info.width, height: info.height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = device.create_image(&create_info)?;
        let requirements = device.image_memory_requirements(image);

        let lease = bind_lease(pool, &requirements, info.properties, |memory, offset| {
            device.bind_image_memory(image, memory, offset)
        });

        let range = match lease {
            Ok((range, _)) => range,
            Err(err) => {
                device.destroy_image(image);
                return Err(err);
            }
        };

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(info.format)
            .subresource_range(color_subresource_range());

        let view = match device.create_image_view(&view_info) {
            Ok(view) => view,
            Err(err) => {
                device.destroy_image(image);
                release_lease(pool, &range, true);
                return Err(err);
            }
        };

        Ok(Self {
            device,
            pool: pool.clone(),
            image,
            view,
            extent: info.extent(),
            format: info.format,
            layout: Cell::new(vk::ImageLayout::UNDEFINED),
            range,
            defragment_on_release: true,
        })
    }

    /// Get image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Get colour view handle
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Image size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Pixel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Layout the last recorded transition left the image in
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout.get()
    }

    pub(crate) fn set_layout(&self, layout: vk::ImageLayout) {
        self.layout.set(layout);
    }

    /// Leased memory range
    pub fn range(&self) -> &MemoryRange {
        &self.range
    }

    /// Whether releasing the lease defragments its block
    pub fn set_defragment_on_release(&mut self, defragment: bool) {
        self.defragment_on_release = defragment;
    }
}

/// Single mip, single layer colour subresource
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl Drop for MemoryImage {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.view);
        self.device.destroy_image(self.image);
        release_lease(&self.pool, &self.range, self.defragment_on_release);
    }
}

impl std::fmt::Debug for MemoryImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImage")
            .field("image", &self.image)
            .field("extent", &self.extent)
            .field("format", &self.format)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockDevice};
    use crate::vulkan::MemoryPool;

    fn attachment(width: u32, height: u32) -> ImageCreateInfo {
        ImageCreateInfo::new(width, height, vk::Format::B8G8R8A8_UNORM)
            .color_attachment()
            .sampled()
            .device_local()
    }

    #[test]
    fn test_image_owns_view_and_lease() {
        let mock = MockDevice::new();
        let pool = MemoryPool::shared(mock.device(), "images", 1 << 20);

        let image = MemoryImage::new(&pool, &attachment(16, 8)).unwrap();
        assert_eq!(image.extent(), vk::Extent2D { width: 16, height: 8 });
        assert_eq!(image.layout(), vk::ImageLayout::UNDEFINED);
        assert!(image.range().size() >= 16 * 8 * 4);
        assert!(pool.borrow().used_size() > 0);

        let (handle, view) = (image.handle(), image.view());
        drop(image);

        let calls = mock.calls();
        assert!(calls.contains(&Call::DestroyImageView(view)));
        assert!(calls.contains(&Call::DestroyImage(handle)));
        assert_eq!(pool.borrow().used_size(), 0);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let mock = MockDevice::new();
        let pool = MemoryPool::shared(mock.device(), "images", 1 << 20);

        assert!(MemoryImage::new(&pool, &attachment(0, 8)).is_err());
        assert_eq!(pool.borrow().block_count(), 0);
    }
}
