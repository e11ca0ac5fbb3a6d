//! Device memory sub-allocation
//!
//! A [`MemoryPool`] owns growable lists of [`MemoryBlock`]s, one fixed-size
//! device allocation each. Blocks hand out [`MemoryRange`] leases with a
//! first-fit scan over a free list and coalesce them again on disposal.
//! [`MemoryBuffer`] and [`MemoryImage`] bind a resource to one lease for
//! their whole lifetime.

mod block;
mod buffer;
mod image;
mod pool;
mod range;

pub use block::{DeviceMemory, MemoryBlock};
pub use buffer::{BufferCreateInfo, MemoryBuffer};
pub use image::{color_subresource_range, ImageCreateInfo, MemoryImage};
pub use pool::{MemoryPool, PoolRef};
pub use range::{BlockId, MemoryRange};
