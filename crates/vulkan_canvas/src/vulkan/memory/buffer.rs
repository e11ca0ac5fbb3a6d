//! Buffers bound to a pool lease

use ash::vk;
use std::ptr::NonNull;

use super::pool::{bind_lease, release_lease};
use super::{MemoryRange, PoolRef};
use crate::vulkan::{DeviceRef, VulkanError, VulkanResult};

/// Buffer creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferCreateInfo {
    /// Size in bytes
    pub size: vk::DeviceSize,
    /// Buffer usage
    pub usage: vk::BufferUsageFlags,
    /// Required memory properties
    pub properties: vk::MemoryPropertyFlags,
}

impl BufferCreateInfo {
    /// Buffer of `size` bytes
    pub fn new(size: vk::DeviceSize) -> Self {
        Self { size, ..Self::default() }
    }

    /// Buffer holding `count` values of `T`
    pub fn for_elements<T>(count: usize) -> Self {
        Self::new((count * std::mem::size_of::<T>()) as vk::DeviceSize)
    }

    /// Usable as vertex buffer
    #[must_use]
    pub fn vertex_buffer(mut self) -> Self {
        self.usage |= vk::BufferUsageFlags::VERTEX_BUFFER;
        self
    }

    /// Usable as index buffer
    #[must_use]
    pub fn index_buffer(mut self) -> Self {
        self.usage |= vk::BufferUsageFlags::INDEX_BUFFER;
        self
    }

    /// Usable as copy source
    #[must_use]
    pub fn transfer_src(mut self) -> Self {
        self.usage |= vk::BufferUsageFlags::TRANSFER_SRC;
        self
    }

    /// Usable as copy destination
    #[must_use]
    pub fn transfer_dst(mut self) -> Self {
        self.usage |= vk::BufferUsageFlags::TRANSFER_DST;
        self
    }

    /// Host visible and coherent memory
    #[must_use]
    pub fn host_visible(mut self) -> Self {
        self.properties |= vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        self
    }

    /// Device local memory
    #[must_use]
    pub fn device_local(mut self) -> Self {
        self.properties |= vk::MemoryPropertyFlags::DEVICE_LOCAL;
        self
    }
}

/// A buffer holding one memory lease for its whole lifetime
///
/// The lease is returned to the pool on drop, defragmenting the block unless
/// [`set_defragment_on_release(false)`](Self::set_defragment_on_release) was called.
pub struct MemoryBuffer {
    device: DeviceRef,
    pool: PoolRef,
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    range: MemoryRange,
    mapped: Option<NonNull<u8>>,
    defragment_on_release: bool,
}

impl MemoryBuffer {
    /// Create a buffer and bind it to a lease from `pool`
    pub fn new(pool: &PoolRef, info: &BufferCreateInfo) -> VulkanResult<Self> {
        if info.size == 0 {
            return Err(VulkanError::invalid("Cannot create an empty buffer"));
        }

        let device = pool.borrow().device().clone();

        let create_info = vk::BufferCreateInfo::builder()
            .size(info.size)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = device.create_buffer(&create_info)?;
        let requirements = device.buffer_memory_requirements(buffer);

        let lease = bind_lease(pool, &requirements, info.properties, |memory, offset| {
            device.bind_buffer_memory(buffer, memory, offset)
        });

        let (range, mapped) = match lease {
            Ok(lease) => lease,
            Err(err) => {
                device.destroy_buffer(buffer);
                return Err(err);
            }
        };

        Ok(Self {
            device,
            pool: pool.clone(),
            buffer,
            size: info.size,
            range,
            mapped,
            defragment_on_release: true,
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Requested size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Leased memory range
    pub fn range(&self) -> &MemoryRange {
        &self.range
    }

    /// Host address of the buffer contents, if host visible
    pub fn data(&self) -> Option<NonNull<u8>> {
        self.mapped
    }

    /// Whether releasing the lease defragments its block
    pub fn set_defragment_on_release(&mut self, defragment: bool) {
        self.defragment_on_release = defragment;
    }

    /// Copy bytes to the start of the buffer
    pub fn write(&self, data: &[u8]) -> VulkanResult<()> {
        self.write_at(0, data)
    }

    /// Copy bytes into the buffer at a byte offset
    pub fn write_at(&self, offset: usize, data: &[u8]) -> VulkanResult<()> {
        let dst = self.host_slice(offset, data.len(), "write")?;
        // SAFETY: the destination lies inside this buffer's mapped lease, which
        // no other wrapper aliases.
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dst.as_ptr(), data.len()) };
        Ok(())
    }

    /// Copy plain-old-data values to the start of the buffer
    pub fn write_slice<T: bytemuck::Pod>(&self, values: &[T]) -> VulkanResult<()> {
        self.write(bytemuck::cast_slice(values))
    }

    /// Copy the start of the buffer into `dst`
    pub fn read_into(&self, dst: &mut [u8]) -> VulkanResult<()> {
        let src = self.host_slice(0, dst.len(), "read")?;
        // SAFETY: see `write_at`.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }

    fn host_slice(&self, offset: usize, len: usize, what: &str) -> VulkanResult<NonNull<u8>> {
        let base = self.mapped.ok_or_else(|| VulkanError::NotHostVisible {
            reason: format!("{what} of {len} bytes into device local buffer"),
        })?;

        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        if end as vk::DeviceSize > self.size {
            return Err(VulkanError::NotHostVisible {
                reason: format!("{what} of {len} bytes at {offset} exceeds buffer of {} bytes", self.size),
            });
        }

        // SAFETY: offset is inside the mapped lease.
        Ok(unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) })
    }
}

impl Drop for MemoryBuffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.buffer);
        release_lease(&self.pool, &self.range, self.defragment_on_release);
    }
}

impl std::fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBuffer")
            .field("buffer", &self.buffer)
            .field("size", &self.size)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}
