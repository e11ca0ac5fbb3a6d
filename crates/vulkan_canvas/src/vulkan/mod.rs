//! Vulkan wrapper layer
//!
//! RAII handle wrappers over the [`GpuDevice`] seam, command recording, the
//! presentation seam and the device memory sub-allocator. Nothing here knows
//! about 2D drawing.

mod ash_device;
mod commands;
mod descriptor;
mod device;
mod error;
pub mod memory;
mod pipeline;
mod render_pass;
mod swapchain;
mod sync;
mod transfer;

pub use ash_device::AshDevice;
pub use commands::{CommandBuffer, CommandSequence, DEFAULT_WAIT_STAGE};
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, ImageDescriptor, Sampler};
pub use device::{find_memory_type, is_host_visible, DeviceRef, GpuDevice, ImageBarrier, QueueSubmission};
pub use error::{VulkanError, VulkanResult};
pub use memory::{
    BlockId, BufferCreateInfo, ImageCreateInfo, MemoryBlock, MemoryBuffer, MemoryImage, MemoryPool, MemoryRange,
    PoolRef,
};
pub use pipeline::{BlendMode, GraphicsPipelineConfig, Pipeline, PipelineLayout, ShaderModule, SPIRV_MAGIC};
pub use render_pass::{Framebuffer, RenderPass};
pub use swapchain::{AcquireOutcome, AshSwapchain, PresentOutcome, PresentationEngine, SurfaceContext};
pub use sync::{Fence, Semaphore, DEFAULT_FENCE_TIMEOUT_NS};
pub use transfer::{fill_quad_indices, BufferTransfer, ImageTransfer};
