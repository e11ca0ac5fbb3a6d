//! Block-level routing and growth

use ash::vk;
use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{BlockId, MemoryBlock, MemoryRange};
use crate::vulkan::device::{find_memory_type, is_host_visible};
use crate::vulkan::{DeviceRef, VulkanError, VulkanResult};

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a pool; resource wrappers return their lease through it
pub type PoolRef = Rc<RefCell<MemoryPool>>;

/// Growable collection of memory blocks servicing range requests
///
/// Requests are routed to the first block of the matching memory type that
/// can hold them, in block creation order. When none can, a new block of
/// `max(min_block_size, size.next_power_of_two())` bytes is allocated.
/// Blocks are only released by [`minimize_storage`](Self::minimize_storage).
pub struct MemoryPool {
    device: DeviceRef,
    name: String,
    min_block_size: vk::DeviceSize,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    blocks: Vec<MemoryBlock>,
}

impl MemoryPool {
    /// Create an empty pool
    pub fn new(device: DeviceRef, name: impl Into<String>, min_block_size: vk::DeviceSize) -> Self {
        let memory_properties = device.memory_properties();
        Self {
            device,
            name: name.into(),
            min_block_size,
            memory_properties,
            blocks: Vec::new(),
        }
    }

    /// Create an empty pool behind a shared handle
    pub fn shared(device: DeviceRef, name: impl Into<String>, min_block_size: vk::DeviceSize) -> PoolRef {
        Rc::new(RefCell::new(Self::new(device, name, min_block_size)))
    }

    /// Device the blocks are allocated from
    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    /// Pool label used in log output
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Smallest block the pool allocates
    pub fn min_block_size(&self) -> vk::DeviceSize {
        self.min_block_size
    }

    /// Acquire a range from a block of the given memory type, growing the pool if needed
    pub fn acquire(
        &mut self,
        size: vk::DeviceSize,
        alignment: vk::DeviceSize,
        memory_type_index: u32,
    ) -> VulkanResult<MemoryRange> {
        if size == 0 {
            return Err(VulkanError::invalid("Cannot acquire an empty memory range"));
        }

        let existing = self
            .blocks
            .iter_mut()
            .filter(|block| block.memory_type_index() == memory_type_index)
            .find_map(|block| block.acquire_range(size, alignment));

        if let Some(range) = existing {
            return Ok(range);
        }

        let block_size = self.min_block_size.max(size.next_power_of_two());
        let host_visible = is_host_visible(&self.memory_properties, memory_type_index);
        let id = BlockId(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed));

        let mut block = MemoryBlock::new(self.device.clone(), id, block_size, memory_type_index, host_visible)?;

        log::debug!(
            "[{}] Allocated memory block {:?}: {} bytes, type {}{}",
            self.name,
            id,
            block_size,
            memory_type_index,
            if host_visible { ", host visible" } else { "" }
        );

        let Some(range) = block.acquire_range(size, alignment) else {
            log::error!("[{}] New block of {} bytes cannot hold {} bytes", self.name, block_size, size);
            debug_assert!(false, "new memory block sized for the request cannot hold it");
            return Err(VulkanError::BlockAllocationFailed { block_size, requested: size });
        };

        self.blocks.push(block);
        Ok(range)
    }

    /// Acquire a range for a resource's memory requirements
    ///
    /// The memory type is the first one allowed by the requirements' type mask
    /// that has all of `properties`.
    pub fn acquire_for(
        &mut self,
        requirements: &vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<MemoryRange> {
        let memory_type_index = self.find_memory_type(requirements.memory_type_bits, properties)?;
        self.acquire(requirements.size, requirements.alignment, memory_type_index)
    }

    /// Resolve property flags to a memory type index
    pub fn find_memory_type(&self, type_bits: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        find_memory_type(&self.memory_properties, type_bits, properties).ok_or_else(|| {
            log::error!(
                "[{}] No memory type in mask {:#b} has properties {:?}",
                self.name,
                type_bits,
                properties
            );
            VulkanError::NoSuitableMemoryType { type_bits, properties }
        })
    }

    /// Return a range to its block
    pub fn dispose(&mut self, range: &MemoryRange, defragment: bool) -> VulkanResult<()> {
        let disposed = self
            .blocks
            .iter_mut()
            .find(|block| block.id() == range.block())
            .is_some_and(|block| block.dispose_range(range, defragment));

        if disposed {
            Ok(())
        } else {
            log::error!("[{}] Disposed range {:?} is not part of this pool", self.name, range);
            Err(VulkanError::RangeNotFound {
                block: range.block().0,
                offset: range.offset(),
                size: range.size(),
            })
        }
    }

    /// Release every block whose ranges are all free; returns how many were released
    ///
    /// Only call while no GPU work can reference memory of this pool.
    pub fn minimize_storage(&mut self) -> usize {
        let before = self.blocks.len();
        let name = &self.name;

        self.blocks.retain(|block| {
            let keep = !block.is_free();
            if !keep {
                log::debug!("[{}] Released memory block {:?}: {} bytes", name, block.id(), block.size());
            }
            keep
        });

        before - self.blocks.len()
    }

    /// Block holding a range
    pub fn block(&self, id: BlockId) -> Option<&MemoryBlock> {
        self.blocks.iter().find(|block| block.id() == id)
    }

    /// All blocks in creation order
    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total bytes allocated from the device
    pub fn size(&self) -> vk::DeviceSize {
        self.blocks.iter().map(MemoryBlock::size).sum()
    }

    /// Bytes currently leased
    pub fn used_size(&self) -> vk::DeviceSize {
        self.blocks.iter().map(MemoryBlock::used_size).sum()
    }

    /// Backing memory handle of a range
    pub fn memory_handle(&self, range: &MemoryRange) -> Option<vk::DeviceMemory> {
        self.block(range.block()).map(MemoryBlock::memory_handle)
    }

    /// Host address of a range, if its block is host visible
    pub fn host_pointer(&self, range: &MemoryRange) -> Option<NonNull<u8>> {
        self.block(range.block()).and_then(|block| block.host_pointer(range))
    }
}

/// Lease memory for a resource and bind it; the lease is returned again if binding fails
pub(crate) fn bind_lease<F>(
    pool: &PoolRef,
    requirements: &vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
    bind: F,
) -> VulkanResult<(MemoryRange, Option<NonNull<u8>>)>
where
    F: FnOnce(vk::DeviceMemory, vk::DeviceSize) -> VulkanResult<()>,
{
    let mut pool = pool.borrow_mut();
    let range = pool.acquire_for(requirements, properties)?;

    let memory = pool
        .memory_handle(&range)
        .ok_or_else(|| VulkanError::invalid("Leased range has no backing block"))?;

    if let Err(err) = bind(memory, range.offset()) {
        pool.dispose(&range, true)?;
        return Err(err);
    }

    Ok((range, pool.host_pointer(&range)))
}

/// Return a lease from a destructor, logging instead of failing
pub(crate) fn release_lease(pool: &PoolRef, range: &MemoryRange, defragment: bool) {
    match pool.try_borrow_mut() {
        Ok(mut pool) => {
            if let Err(err) = pool.dispose(range, defragment) {
                log::error!("Failed to release memory lease: {}", err);
            }
        }
        Err(_) => log::error!("Memory pool busy while releasing {:?}; range leaked", range),
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("name", &self.name)
            .field("min_block_size", &self.min_block_size)
            .field("blocks", &self.blocks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;

    const HOST: u32 = MockDevice::HOST_VISIBLE_TYPE;
    const LOCAL: u32 = MockDevice::DEVICE_LOCAL_TYPE;

    #[test]
    fn test_small_then_large_request_grows_once() {
        let mock = MockDevice::new();
        let mut pool = MemoryPool::new(mock.device(), "test", 1024);

        let small = pool.acquire(100, 16, HOST).unwrap();
        assert_eq!(small.offset(), 0);
        assert!(small.size() >= 100);
        assert_eq!(pool.block_count(), 1);
        assert_eq!(pool.blocks()[0].size(), 1024);

        let large = pool.acquire(2048, 16, HOST).unwrap();
        assert_eq!(pool.block_count(), 2);
        assert_eq!(pool.blocks()[1].size(), 2048);
        assert_eq!(large.block(), pool.blocks()[1].id());
        assert_eq!(large.offset(), 0);
    }

    #[test]
    fn test_growth_uses_next_power_of_two() {
        let mock = MockDevice::new();
        let mut pool = MemoryPool::new(mock.device(), "test", 1024);

        pool.acquire(3000, 0, LOCAL).unwrap();
        assert_eq!(pool.blocks()[0].size(), 4096);

        // Fits the remainder of the existing block, no growth
        pool.acquire(1000, 0, LOCAL).unwrap();
        assert_eq!(pool.block_count(), 1);

        pool.acquire(200, 0, LOCAL).unwrap();
        assert_eq!(pool.block_count(), 2);
        assert_eq!(pool.blocks()[1].size(), 1024);
    }

    #[test]
    fn test_requests_routed_by_memory_type() {
        let mock = MockDevice::new();
        let mut pool = MemoryPool::new(mock.device(), "test", 1024);

        let host = pool.acquire(64, 0, HOST).unwrap();
        let local = pool.acquire(64, 0, LOCAL).unwrap();

        assert_ne!(host.block(), local.block());
        assert_eq!(pool.block(local.block()).unwrap().memory_type_index(), LOCAL);
        assert!(pool.host_pointer(&host).is_some());
        assert!(pool.host_pointer(&local).is_none());
    }

    #[test]
    fn test_acquire_for_resolves_properties() {
        let mock = MockDevice::new();
        let mut pool = MemoryPool::new(mock.device(), "test", 1024);

        let requirements = vk::MemoryRequirements { size: 200, alignment: 64, memory_type_bits: 0b111 };
        let range = pool.acquire_for(&requirements, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();

        assert_eq!(pool.block(range.block()).unwrap().memory_type_index(), HOST);
    }

    #[test]
    fn test_unresolvable_memory_type_is_an_error() {
        let mock = MockDevice::new();
        let mut pool = MemoryPool::new(mock.device(), "test", 1024);

        let requirements = vk::MemoryRequirements { size: 200, alignment: 64, memory_type_bits: 1 << LOCAL };
        let result = pool.acquire_for(&requirements, vk::MemoryPropertyFlags::HOST_VISIBLE);

        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType { .. })));
        assert_eq!(pool.block_count(), 0);
        assert_eq!(mock.live_allocations(), 0);
    }

    #[test]
    fn test_dispose_and_minimize() {
        let mock = MockDevice::new();
        let mut pool = MemoryPool::new(mock.device(), "test", 1024);

        let a = pool.acquire(512, 0, HOST).unwrap();
        let b = pool.acquire(2048, 0, HOST).unwrap();
        assert_eq!(pool.size(), 1024 + 2048);

        pool.dispose(&b, true).unwrap();
        assert_eq!(pool.minimize_storage(), 1);
        assert_eq!(pool.block_count(), 1);
        assert_eq!(mock.live_allocations(), 1);

        assert!(matches!(pool.dispose(&b, true), Err(VulkanError::RangeNotFound { .. })));

        pool.dispose(&a, false).unwrap();
        assert_eq!(pool.used_size(), 0);
        assert_eq!(pool.minimize_storage(), 1);
        assert_eq!(mock.live_allocations(), 0);
    }

    #[test]
    fn test_empty_request_rejected() {
        let mock = MockDevice::new();
        let mut pool = MemoryPool::new(mock.device(), "test", 1024);
        assert!(pool.acquire(0, 0, HOST).is_err());
        assert_eq!(pool.block_count(), 0);
    }
}
