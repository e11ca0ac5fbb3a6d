//! Memory pools shared by everything drawn on one device

use crate::config::MemoryConfig;
use crate::vulkan::{
    fill_quad_indices, BufferCreateInfo, BufferTransfer, DeviceRef, MemoryBuffer, MemoryPool, PoolRef, VulkanResult,
};

/// Quads drawn by one indexed draw call at most
pub const MAX_QUADS: usize = 1024;

const SMALL_TEXTURE_PIXELS: u32 = 64 * 64;
const MEDIUM_TEXTURE_PIXELS: u32 = 512 * 512;

/// Per-device pools, one per allocation pattern
///
/// Textures are split by size so small, short-lived images do not fragment
/// the blocks holding large ones.
pub struct CachedMemory {
    staging: PoolRef,
    small_textures: PoolRef,
    medium_textures: PoolRef,
    big_textures: PoolRef,
    framebuffers: PoolRef,
    vertices: PoolRef,
    quad_indices: MemoryBuffer,
}

impl CachedMemory {
    /// Create the pools and upload the shared quad index buffer
    pub fn new(device: DeviceRef, config: &MemoryConfig) -> VulkanResult<Self> {
        let pool = |name: &str, size: u64| MemoryPool::shared(device.clone(), name, size);

        let staging = pool("staging", config.staging_block_size);
        let small_textures = pool("small textures", config.small_texture_block_size);
        let medium_textures = pool("medium textures", config.medium_texture_block_size);
        let big_textures = pool("big textures", config.big_texture_block_size);
        let framebuffers = pool("framebuffers", config.framebuffer_block_size);
        let vertices = pool("vertices", config.vertex_block_size);

        let quad_indices = Self::upload_quad_indices(device, &staging, &vertices)?;

        Ok(Self {
            staging,
            small_textures,
            medium_textures,
            big_textures,
            framebuffers,
            vertices,
            quad_indices,
        })
    }

    fn upload_quad_indices(device: DeviceRef, staging: &PoolRef, vertices: &PoolRef) -> VulkanResult<MemoryBuffer> {
        let mut indices = vec![0u16; MAX_QUADS * 6];
        fill_quad_indices(&mut indices);

        let info = BufferCreateInfo::for_elements::<u16>(indices.len())
            .index_buffer()
            .transfer_dst()
            .device_local();
        let buffer = MemoryBuffer::new(vertices, &info)?;

        let mut transfer = BufferTransfer::new(device, staging, buffer.size())?;
        transfer.staging().write_slice(&indices)?;
        transfer.copy_to(&buffer)?;
        transfer.wait()?;

        log::debug!("Uploaded quad index buffer for {MAX_QUADS} quads");
        Ok(buffer)
    }

    /// Host-visible staging buffers
    pub fn staging(&self) -> &PoolRef {
        &self.staging
    }

    /// Pool for a texture of the given size
    pub fn texture_pool(&self, width: u32, height: u32) -> &PoolRef {
        let pixels = width.saturating_mul(height);
        if pixels <= SMALL_TEXTURE_PIXELS {
            &self.small_textures
        } else if pixels <= MEDIUM_TEXTURE_PIXELS {
            &self.medium_textures
        } else {
            &self.big_textures
        }
    }

    /// Layer attachments
    pub fn framebuffers(&self) -> &PoolRef {
        &self.framebuffers
    }

    /// Vertex buffers written once per flush
    pub fn vertices(&self) -> &PoolRef {
        &self.vertices
    }

    /// Index buffer covering [`MAX_QUADS`] quads
    pub fn quad_index_buffer(&self) -> &MemoryBuffer {
        &self.quad_indices
    }

    /// Release every block without live leases; returns the number released
    pub fn minimize_storage(&self) -> usize {
        [
            &self.staging,
            &self.small_textures,
            &self.medium_textures,
            &self.big_textures,
            &self.framebuffers,
            &self.vertices,
        ]
        .into_iter()
        .map(|pool| match pool.try_borrow_mut() {
            Ok(mut pool) => pool.minimize_storage(),
            Err(_) => {
                log::warn!("Memory pool busy, skipping minimization");
                0
            }
        })
        .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockDevice};

    #[test]
    fn test_quad_indices_are_uploaded_once() {
        let mock = MockDevice::new();
        let memory = CachedMemory::new(mock.device(), &MemoryConfig::default()).unwrap();

        assert_eq!(memory.quad_index_buffer().size(), (MAX_QUADS * 6 * 2) as u64);
        assert_eq!(mock.submissions().len(), 1);
        assert_eq!(mock.count(|c| matches!(c, Call::CopyBuffer { .. })), 1);
    }

    #[test]
    fn test_texture_pool_by_size() {
        let mock = MockDevice::new();
        let memory = CachedMemory::new(mock.device(), &MemoryConfig::default()).unwrap();

        assert_eq!(memory.texture_pool(64, 64).borrow().name(), "small textures");
        assert_eq!(memory.texture_pool(65, 64).borrow().name(), "medium textures");
        assert_eq!(memory.texture_pool(512, 512).borrow().name(), "medium textures");
        assert_eq!(memory.texture_pool(1024, 512).borrow().name(), "big textures");
    }

    #[test]
    fn test_minimize_keeps_live_blocks() {
        let mock = MockDevice::new();
        let memory = CachedMemory::new(mock.device(), &MemoryConfig::default()).unwrap();

        // The staging buffer of the index upload is gone, the index buffer is not.
        assert_eq!(memory.minimize_storage(), 1);
        assert_eq!(memory.vertices().borrow().block_count(), 1);
        assert_eq!(memory.staging().borrow().block_count(), 0);
    }
}
