//! Staging transfers between host memory, buffers and images

use ash::vk;
use std::time::Duration;

use super::memory::{BufferCreateInfo, MemoryBuffer, MemoryImage, PoolRef};
use super::{CommandSequence, DeviceRef, VulkanError, VulkanResult};

const BYTES_PER_PIXEL: u64 = 4;
const FENCE_STEP: Duration = Duration::from_millis(10);

/// Index pattern drawing quads of four vertices as two triangles each
///
/// Quad `n` uses vertices `4n..4n+4` as `[0 1 2 1 2 3]`.
pub fn fill_quad_indices(indices: &mut [u16]) {
    for (quad, chunk) in indices.chunks_mut(6).enumerate() {
        let base = (quad * 4) as u16;
        let pattern = [base, base + 1, base + 2, base + 1, base + 2, base + 3];
        for (dst, src) in chunk.iter_mut().zip(pattern) {
            *dst = src;
        }
    }
}

/// Upload and download of BGRA8 images through a host-visible staging buffer
///
/// Each copy is one fenced submission of a private [`CommandSequence`];
/// the staging buffer must not be touched until [`is_complete`](Self::is_complete).
pub struct ImageTransfer {
    staging: MemoryBuffer,
    sequence: CommandSequence,
    extent: vk::Extent2D,
}

impl ImageTransfer {
    /// Create a staging buffer sized for a `extent` BGRA8 image
    pub fn new(device: DeviceRef, staging_pool: &PoolRef, extent: vk::Extent2D) -> VulkanResult<Self> {
        let size = u64::from(extent.width) * u64::from(extent.height) * BYTES_PER_PIXEL;
        let staging = MemoryBuffer::new(
            staging_pool,
            &BufferCreateInfo::new(size).transfer_src().transfer_dst().host_visible(),
        )?;

        Ok(Self {
            staging,
            sequence: CommandSequence::new(device)?,
            extent,
        })
    }

    /// Image size the staging buffer holds
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Fill the staging buffer with tightly packed BGRA8 rows
    pub fn write_pixels(&self, pixels: &[u8]) -> VulkanResult<()> {
        self.check_len(pixels.len())?;
        self.staging.write(pixels)
    }

    /// Read tightly packed BGRA8 rows back from the staging buffer
    pub fn read_pixels(&self, pixels: &mut [u8]) -> VulkanResult<()> {
        self.check_len(pixels.len())?;
        self.staging.read_into(pixels)
    }

    /// Copy the staging buffer into `image`, leaving it ready for sampling
    pub fn copy_buffer_to_image(&mut self, image: &MemoryImage) -> VulkanResult<()> {
        self.check_extent(image)?;

        let buffer = self.staging.handle();
        let handle = image.handle();
        let extent = self.extent;

        self.sequence.submit(
            |cb| {
                cb.transition_image_layout(handle, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
                cb.copy_buffer_to_image(buffer, handle, extent);
                cb.transition_image_layout(
                    handle,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            },
            true,
        )?;

        image.set_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        Ok(())
    }

    /// Copy a sampled image into the staging buffer
    pub fn copy_image_to_buffer(&mut self, image: &MemoryImage) -> VulkanResult<()> {
        self.check_extent(image)?;

        let buffer = self.staging.handle();
        let handle = image.handle();
        let extent = self.extent;
        let layout = image.layout();

        self.sequence.submit(
            |cb| {
                cb.transition_image_layout(handle, layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
                cb.copy_image_to_buffer(handle, buffer, extent);
                cb.transition_image_layout(
                    handle,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            },
            true,
        )?;

        image.set_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        Ok(())
    }

    /// True once the last copy has executed
    pub fn is_complete(&self) -> VulkanResult<bool> {
        self.sequence.is_complete()
    }

    /// Block until the last copy has executed
    pub fn wait(&mut self) -> VulkanResult<()> {
        self.sequence.wait_for_fence(FENCE_STEP)
    }

    fn check_len(&self, len: usize) -> VulkanResult<()> {
        let expected = u64::from(self.extent.width) * u64::from(self.extent.height) * BYTES_PER_PIXEL;
        if len as u64 == expected {
            Ok(())
        } else {
            Err(VulkanError::invalid(format!(
                "Pixel data of {len} bytes does not match {}x{} BGRA8 image",
                self.extent.width, self.extent.height
            )))
        }
    }

    fn check_extent(&self, image: &MemoryImage) -> VulkanResult<()> {
        if image.extent() == self.extent {
            Ok(())
        } else {
            Err(VulkanError::invalid(format!(
                "Transfer of {:?} cannot target image of {:?}",
                self.extent,
                image.extent()
            )))
        }
    }
}

/// Upload into a device-local buffer through a host-visible staging buffer
pub struct BufferTransfer {
    staging: MemoryBuffer,
    sequence: CommandSequence,
}

impl BufferTransfer {
    /// Create a staging buffer of `size` bytes
    pub fn new(device: DeviceRef, staging_pool: &PoolRef, size: vk::DeviceSize) -> VulkanResult<Self> {
        let staging = MemoryBuffer::new(staging_pool, &BufferCreateInfo::new(size).transfer_src().host_visible())?;
        Ok(Self {
            staging,
            sequence: CommandSequence::new(device)?,
        })
    }

    /// Staging buffer to fill before copying
    pub fn staging(&self) -> &MemoryBuffer {
        &self.staging
    }

    /// Copy the whole staging buffer to the start of `dst`
    pub fn copy_to(&mut self, dst: &MemoryBuffer) -> VulkanResult<()> {
        let size = self.staging.size();
        if dst.size() < size {
            return Err(VulkanError::invalid(format!(
                "Buffer of {} bytes cannot receive {size} staged bytes",
                dst.size()
            )));
        }

        let (src, dst) = (self.staging.handle(), dst.handle());
        self.sequence.submit(|cb| cb.copy_buffer(src, dst, size), true)
    }

    /// Block until the copy has executed
    pub fn wait(&mut self) -> VulkanResult<()> {
        self.sequence.wait_for_fence(FENCE_STEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockDevice};
    use crate::vulkan::memory::ImageCreateInfo;
    use crate::vulkan::MemoryPool;

    #[test]
    fn test_quad_indices() {
        let mut indices = [0u16; 12];
        fill_quad_indices(&mut indices);
        assert_eq!(indices, [0, 1, 2, 1, 2, 3, 4, 5, 6, 5, 6, 7]);
    }

    #[test]
    fn test_upload_transitions_to_shader_read() {
        let mock = MockDevice::new();
        let staging = MemoryPool::shared(mock.device(), "staging", 1 << 16);
        let images = MemoryPool::shared(mock.device(), "images", 1 << 16);

        let image = MemoryImage::new(
            &images,
            &ImageCreateInfo::new(4, 2, vk::Format::B8G8R8A8_UNORM)
                .sampled()
                .transfer_dst()
                .device_local(),
        )
        .unwrap();

        let mut transfer = ImageTransfer::new(mock.device(), &staging, image.extent()).unwrap();
        assert!(transfer.write_pixels(&[0; 7]).is_err());
        transfer.write_pixels(&[0xAB; 32]).unwrap();
        transfer.copy_buffer_to_image(&image).unwrap();

        let barriers: Vec<_> = mock
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ImageBarrier { new_layout, .. } => Some(new_layout),
                _ => None,
            })
            .collect();
        assert_eq!(
            barriers,
            [vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL]
        );
        assert_eq!(image.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(transfer.is_complete().unwrap());

        let mut back = [0u8; 32];
        transfer.read_pixels(&mut back).unwrap();
        assert_eq!(back, [0xAB; 32]);
    }

    #[test]
    fn test_buffer_copy_is_fenced() {
        let mock = MockDevice::new();
        let staging = MemoryPool::shared(mock.device(), "staging", 1 << 16);
        let local = MemoryPool::shared(mock.device(), "local", 1 << 16);

        let dst = MemoryBuffer::new(&local, &BufferCreateInfo::new(64).transfer_dst().device_local()).unwrap();
        let mut transfer = BufferTransfer::new(mock.device(), &staging, 64).unwrap();
        transfer.staging().write(&[1; 64]).unwrap();
        transfer.copy_to(&dst).unwrap();
        transfer.wait().unwrap();

        let submits = mock.submissions();
        assert_eq!(submits.len(), 1);
        assert!(submits[0].fence.is_some());
        assert!(mock.calls().contains(&Call::CopyBuffer { src: transfer.staging().handle(), dst: dst.handle(), size: 64 }));
    }
}
