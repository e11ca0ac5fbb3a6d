//! Offset/size windows inside a memory block

use ash::vk;

/// Identifies the block a range belongs to, without owning it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

/// A contiguous window of a memory block, tagged free or used
///
/// Equality compares block, offset, size and the free flag; a lease is found
/// again on disposal by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    block: BlockId,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    free: bool,
}

impl MemoryRange {
    pub(crate) const fn new(block: BlockId, offset: vk::DeviceSize, size: vk::DeviceSize, free: bool) -> Self {
        Self { block, offset, size, free }
    }

    /// Owning block
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Offset from the start of the block
    pub const fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    /// Length in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// One past the last byte
    pub const fn end(&self) -> vk::DeviceSize {
        self.offset + self.size
    }

    /// True if the range is not leased
    pub const fn is_free(&self) -> bool {
        self.free
    }

    /// True if the range covers no bytes
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// True if the two ranges share at least one byte
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    pub(crate) fn set_free(&mut self, free: bool) {
        self.free = free;
    }

    pub(crate) fn set_offset(&mut self, offset: vk::DeviceSize) {
        self.offset = offset;
    }

    pub(crate) fn set_size(&mut self, size: vk::DeviceSize) {
        self.size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_includes_free_flag() {
        let used = MemoryRange::new(BlockId(1), 0, 64, false);
        let mut freed = used;
        freed.set_free(true);

        assert_ne!(used, freed);
        assert_ne!(used, MemoryRange::new(BlockId(2), 0, 64, false));
        assert_eq!(used, MemoryRange::new(BlockId(1), 0, 64, false));
    }

    #[test]
    fn test_overlap() {
        let a = MemoryRange::new(BlockId(0), 0, 64, false);
        let b = MemoryRange::new(BlockId(0), 64, 64, false);
        let c = MemoryRange::new(BlockId(0), 32, 64, false);

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }
}
