//! Fixed-size device allocations subdivided into ranges

use ash::vk;
use std::ptr::NonNull;

use super::{BlockId, MemoryRange};
use crate::vulkan::{DeviceRef, VulkanResult};

/// One backing device allocation, persistently mapped when host visible
pub struct DeviceMemory {
    device: DeviceRef,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    mapped: Option<NonNull<u8>>,
}

impl DeviceMemory {
    /// Allocate memory of the given type, mapping it when requested
    pub fn allocate(device: DeviceRef, size: vk::DeviceSize, memory_type_index: u32, map: bool) -> VulkanResult<Self> {
        let memory = device.allocate_memory(size, memory_type_index)?;

        let mapped = if map {
            match device.map_memory(memory, size) {
                Ok(ptr) => NonNull::new(ptr),
                Err(err) => {
                    device.free_memory(memory);
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(Self { device, memory, size, mapped })
    }

    /// Get the memory handle
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Allocation size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Host address of the first byte, if mapped
    pub fn mapped(&self) -> Option<NonNull<u8>> {
        self.mapped
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        if self.mapped.take().is_some() {
            self.device.unmap_memory(self.memory);
        }
        self.device.free_memory(self.memory);
    }
}

/// A single fixed-size device allocation handing out ranges
///
/// Ranges are kept in an unordered list; acquisition is first-fit over the
/// list order, and [`defragment_ranges`](Self::defragment_ranges) restores
/// offset order while coalescing neighbouring free ranges.
///
/// Alignment padding in front of an acquired range is not tracked by any
/// range. It is reclaimed only when it ends up at either end of the block or
/// between two free ranges that get merged.
pub struct MemoryBlock {
    id: BlockId,
    memory: DeviceMemory,
    memory_type_index: u32,
    ranges: Vec<MemoryRange>,
}

impl MemoryBlock {
    /// Allocate a block with one free range spanning all of it
    pub fn new(
        device: DeviceRef,
        id: BlockId,
        size: vk::DeviceSize,
        memory_type_index: u32,
        host_visible: bool,
    ) -> VulkanResult<Self> {
        let memory = DeviceMemory::allocate(device, size, memory_type_index, host_visible)?;

        Ok(Self {
            id,
            memory,
            memory_type_index,
            ranges: vec![MemoryRange::new(id, 0, size, true)],
        })
    }

    /// Block identifier stamped into every range
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Total size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.memory.size()
    }

    /// Memory type of the backing allocation
    pub fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }

    /// Backing memory handle, for binding resources
    pub fn memory_handle(&self) -> vk::DeviceMemory {
        self.memory.handle()
    }

    /// True if the block is persistently mapped
    pub fn is_host_visible(&self) -> bool {
        self.memory.mapped().is_some()
    }

    /// Host address of a range inside this block
    pub fn host_pointer(&self, range: &MemoryRange) -> Option<NonNull<u8>> {
        if range.block() != self.id || range.end() > self.size() {
            return None;
        }

        let offset = usize::try_from(range.offset()).ok()?;
        self.memory
            .mapped()
            // SAFETY: the offset lies inside the mapped allocation.
            .map(|base| unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) })
    }

    /// Current ranges in list order
    pub fn ranges(&self) -> &[MemoryRange] {
        &self.ranges
    }

    /// True iff every range is free
    pub fn is_free(&self) -> bool {
        self.ranges.iter().all(MemoryRange::is_free)
    }

    /// Bytes covered by used ranges
    pub fn used_size(&self) -> vk::DeviceSize {
        self.ranges.iter().filter(|r| !r.is_free()).map(MemoryRange::size).sum()
    }

    /// First-fit acquisition of `size` bytes aligned to `alignment`
    ///
    /// An alignment of zero means unaligned. Returns `None` when no free range
    /// can hold the request after padding, so the caller can try another block.
    pub fn acquire_range(&mut self, size: vk::DeviceSize, alignment: vk::DeviceSize) -> Option<MemoryRange> {
        if size == 0 {
            return None;
        }

        let (index, padding) = self.find_free_range(size, alignment)?;

        let range = &mut self.ranges[index];
        let leftover = range.size() - padding - size;

        range.set_offset(range.offset() + padding);
        range.set_size(size);
        range.set_free(false);
        let acquired = *range;

        if leftover > 0 {
            self.ranges
                .push(MemoryRange::new(self.id, acquired.end(), leftover, true));
        }

        Some(acquired)
    }

    fn find_free_range(&self, size: vk::DeviceSize, alignment: vk::DeviceSize) -> Option<(usize, vk::DeviceSize)> {
        self.ranges.iter().enumerate().find_map(|(i, range)| {
            if !range.is_free() {
                return None;
            }

            let padding = if alignment == 0 {
                0
            } else {
                (alignment - range.offset() % alignment) % alignment
            };

            (range.size() >= padding && range.size() - padding >= size).then_some((i, padding))
        })
    }

    /// Return a leased range, matched by value; `false` if it is not part of this block
    pub fn dispose_range(&mut self, range: &MemoryRange, defragment_after: bool) -> bool {
        let Some(stored) = self.ranges.iter_mut().find(|r| **r == *range) else {
            return false;
        };

        stored.set_free(true);

        if defragment_after {
            self.defragment_ranges();
        }
        true
    }

    /// Coalesce free ranges
    pub fn defragment_ranges(&mut self) {
        if self.merge_all_ranges() {
            return;
        }

        self.ranges.sort_by_key(MemoryRange::offset);
        self.merge_adjacent_ranges();
        self.ranges.retain(|r| !r.is_empty());

        let block_size = self.size();

        if let Some(first) = self.ranges.first_mut().filter(|r| r.is_free()) {
            let end = first.end();
            first.set_offset(0);
            first.set_size(end);
        }

        if let Some(last) = self.ranges.last_mut().filter(|r| r.is_free()) {
            if last.end() < block_size {
                last.set_size(block_size - last.offset());
            }
        }
    }

    fn merge_all_ranges(&mut self) -> bool {
        if !self.is_free() {
            return false;
        }

        self.ranges.clear();
        self.ranges.push(MemoryRange::new(self.id, 0, self.size(), true));
        true
    }

    // Right to left, so a left range absorbs a run of free ranges in one pass
    fn merge_adjacent_ranges(&mut self) {
        for i in (1..self.ranges.len()).rev() {
            let right = self.ranges[i];
            let left = self.ranges[i - 1];

            if !right.is_free() || !left.is_free() {
                continue;
            }

            self.ranges[i - 1].set_size(left.size() + (right.end() - left.end()));
            self.ranges[i].set_offset(0);
            self.ranges[i].set_size(0);
        }
    }

    /// Uncovered byte intervals `(offset, size)` between ranges, in offset order
    ///
    /// These are the alignment-induced gaps that no range accounts for.
    pub fn gaps(&self) -> Vec<(vk::DeviceSize, vk::DeviceSize)> {
        let mut sorted: Vec<_> = self.ranges.iter().filter(|r| !r.is_empty()).collect();
        sorted.sort_by_key(|r| r.offset());

        let mut gaps = Vec::new();
        let mut cursor = 0;
        for range in sorted {
            if range.offset() > cursor {
                gaps.push((cursor, range.offset() - cursor));
            }
            cursor = cursor.max(range.end());
        }
        if cursor < self.size() {
            gaps.push((cursor, self.size() - cursor));
        }
        gaps
    }

    /// Check that ranges are in bounds and never overlap
    pub fn validate(&self) -> Result<(), String> {
        let mut sorted: Vec<_> = self.ranges.iter().collect();
        sorted.sort_by_key(|r| r.offset());

        for range in &sorted {
            if range.block() != self.id {
                return Err(format!("range {range:?} carries a foreign block id"));
            }
            if range.end() > self.size() {
                return Err(format!("range {range:?} exceeds block size {}", self.size()));
            }
        }

        for pair in sorted.windows(2) {
            if pair[0].end() > pair[1].offset() {
                return Err(format!("ranges {:?} and {:?} overlap", pair[0], pair[1]));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("id", &self.id)
            .field("size", &self.size())
            .field("memory_type_index", &self.memory_type_index)
            .field("ranges", &self.ranges)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;
    use std::rc::Rc;

    fn block(mock: &Rc<MockDevice>, size: u64) -> MemoryBlock {
        MemoryBlock::new(mock.device(), BlockId(7), size, MockDevice::HOST_VISIBLE_TYPE, true).unwrap()
    }

    fn sorted(block: &MemoryBlock) -> Vec<MemoryRange> {
        let mut ranges = block.ranges().to_vec();
        ranges.sort_by_key(MemoryRange::offset);
        ranges
    }

    fn assert_tiles(block: &MemoryBlock) {
        let mut cursor = 0;
        for range in sorted(block) {
            assert_eq!(range.offset(), cursor, "gap or overlap before {range:?}");
            cursor = range.end();
        }
        assert_eq!(cursor, block.size());
    }

    #[test]
    fn test_new_block_is_single_free_range() {
        let mock = MockDevice::new();
        let block = block(&mock, 1024);

        assert!(block.is_free());
        assert_eq!(block.ranges(), &[MemoryRange::new(BlockId(7), 0, 1024, true)]);
        assert!(block.is_host_visible());
    }

    #[test]
    fn test_aligned_workload_tiles_block() {
        let mock = MockDevice::new();
        let mut block = block(&mock, 1024);

        for size in [64, 128, 16, 256, 32] {
            block.acquire_range(size, 16).unwrap();
            assert_tiles(&block);
        }

        let second = sorted(&block)[1];
        assert!(block.dispose_range(&second, false));
        assert_tiles(&block);
        block.defragment_ranges();
        assert_tiles(&block);
    }

    #[test]
    fn test_alignment_is_respected() {
        let mock = MockDevice::new();
        let mut block = block(&mock, 4096);

        block.acquire_range(10, 0).unwrap();
        for alignment in [16, 64, 256, 3] {
            let range = block.acquire_range(100, alignment).unwrap();
            assert_eq!(range.offset() % alignment, 0);
            assert!(range.size() >= 100);
        }
        block.validate().unwrap();
    }

    #[test]
    fn test_no_double_allocation() {
        let mock = MockDevice::new();
        let mut block = block(&mock, 2048);

        let ranges: Vec<_> = [100, 7, 300, 64, 1, 250]
            .iter()
            .zip([0, 8, 32, 16, 0, 128])
            .map(|(&size, alignment)| block.acquire_range(size, alignment).unwrap())
            .collect();

        for (i, a) in ranges.iter().enumerate() {
            for b in &ranges[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
        block.validate().unwrap();
    }

    #[test]
    fn test_acquire_then_dispose_restores_block() {
        let mock = MockDevice::new();
        let mut block = block(&mock, 1024);
        let before = block.ranges().to_vec();

        let range = block.acquire_range(100, 16).unwrap();
        assert!(block.dispose_range(&range, true));

        assert_eq!(block.ranges(), before.as_slice());
    }

    #[test]
    fn test_all_free_collapses_to_one_range() {
        let mock = MockDevice::new();
        let mut block = block(&mock, 4096);

        let ranges: Vec<_> = [10, 33, 200, 5, 64, 900]
            .iter()
            .zip([0, 16, 64, 4, 256, 32])
            .map(|(&size, alignment)| block.acquire_range(size, alignment).unwrap())
            .collect();

        for i in [3, 0, 5, 1, 4, 2] {
            assert!(block.dispose_range(&ranges[i], false));
        }
        block.defragment_ranges();

        assert_eq!(block.ranges(), &[MemoryRange::new(BlockId(7), 0, 4096, true)]);
    }

    #[test]
    fn test_middle_then_left_dispose_merges_exactly() {
        let mock = MockDevice::new();
        let mut block = block(&mock, 1024);

        let left = block.acquire_range(128, 0).unwrap();
        let middle = block.acquire_range(256, 0).unwrap();
        let right = block.acquire_range(64, 0).unwrap();

        assert!(block.dispose_range(&middle, false));
        assert!(block.dispose_range(&left, false));
        block.defragment_ranges();

        let ranges = block.ranges();
        assert_eq!(ranges[0], MemoryRange::new(BlockId(7), 0, 384, true));
        assert_eq!(ranges[1], right);
        assert_eq!(ranges[2], MemoryRange::new(BlockId(7), 448, 576, true));
        assert_eq!(ranges.len(), 3);
    }

    #[test]
    fn test_request_too_large_fails() {
        let mock = MockDevice::new();
        let mut block = block(&mock, 1024);

        assert!(block.acquire_range(2048, 0).is_none());
        block.acquire_range(1000, 0).unwrap();
        assert!(block.acquire_range(17, 16).is_none());
        assert!(block.acquire_range(16, 16).is_some());
        assert!(block.acquire_range(0, 0).is_none());
    }

    #[test]
    fn test_dispose_unknown_range_is_rejected() {
        let mock = MockDevice::new();
        let mut block = block(&mock, 1024);
        let range = block.acquire_range(64, 0).unwrap();

        let stranger = MemoryRange::new(BlockId(8), range.offset(), range.size(), false);
        assert!(!block.dispose_range(&stranger, true));
        assert!(block.dispose_range(&range, true));
        assert!(!block.dispose_range(&range, true));
    }

    #[test]
    fn test_alignment_gap_is_a_known_hole() {
        let mock = MockDevice::new();
        let mut block = block(&mock, 1024);

        let first = block.acquire_range(10, 0).unwrap();
        let second = block.acquire_range(16, 16).unwrap();
        assert_eq!(second.offset(), 16);
        assert_eq!(block.gaps(), vec![(10, 6)]);

        // Padding between a used range and a free one stays unaccounted
        assert!(block.dispose_range(&second, true));
        assert_eq!(block.gaps(), vec![(10, 6)]);
        assert_eq!(sorted(&block)[1], MemoryRange::new(BlockId(7), 16, 1008, true));

        assert!(block.dispose_range(&first, true));
        assert!(block.gaps().is_empty());
        assert_tiles(&block);
    }

    #[test]
    fn test_host_pointer_offsets() {
        let mock = MockDevice::new();
        let mut block = block(&mock, 1024);
        let a = block.acquire_range(64, 0).unwrap();
        let b = block.acquire_range(64, 0).unwrap();

        let pa = block.host_pointer(&a).unwrap().as_ptr() as usize;
        let pb = block.host_pointer(&b).unwrap().as_ptr() as usize;
        assert_eq!(pb - pa, 64);
    }

    #[test]
    fn test_memory_freed_on_drop() {
        let mock = MockDevice::new();
        let block = block(&mock, 1024);
        assert_eq!(mock.live_allocations(), 1);
        drop(block);
        assert_eq!(mock.live_allocations(), 0);
    }
}
