//! The graphics device seam
//!
//! Everything above this module talks to the GPU through [`GpuDevice`], a
//! narrow trait mirroring the subset of `ash::Device` the allocator and the
//! renderer need. [`AshDevice`](super::AshDevice) forwards to a real Vulkan
//! device; tests substitute a recording mock.
//!
//! Handles crossing the seam are plain `ash::vk` handle types. Ownership of
//! each handle lives in the RAII wrappers built on top of the trait.

use ash::vk;
use std::rc::Rc;

use super::VulkanResult;

/// Shared device reference held by every wrapper
pub type DeviceRef = Rc<dyn GpuDevice>;

/// One queue submission with at most a single wait and a single signal semaphore
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueSubmission<'a> {
    /// Command buffers executed in order
    pub command_buffers: &'a [vk::CommandBuffer],
    /// Semaphore waited on before the given pipeline stage runs
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
    /// Semaphore signaled once the command buffers complete
    pub signal: Option<vk::Semaphore>,
    /// Fence signaled once the command buffers complete
    pub fence: Option<vk::Fence>,
}

/// Image layout transition recorded as a pipeline barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    /// Image to transition
    pub image: vk::Image,
    /// Layout before the barrier
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Accesses that must complete first
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the barrier
    pub dst_access: vk::AccessFlags,
    /// Stages that must complete first
    pub src_stage: vk::PipelineStageFlags,
    /// Stages that wait for the barrier
    pub dst_stage: vk::PipelineStageFlags,
}

impl ImageBarrier {
    /// Barrier for one of the layout transitions used by transfers and layers
    pub fn transition(image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        let (src_access, src_stage) = match old_layout {
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
            }
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
            }
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
                (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
            }
            _ => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
        };

        let (dst_access, dst_stage) = match new_layout {
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
            }
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
            }
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
                (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
            }
            _ => (vk::AccessFlags::empty(), vk::PipelineStageFlags::BOTTOM_OF_PIPE),
        };

        Self { image, old_layout, new_layout, src_access, dst_access, src_stage, dst_stage }
    }
}

/// Device operations consumed by the allocator and the renderer
///
/// Destroy/free calls never fail. Fence waits report a timeout as `Ok(false)`,
/// never as an error. All recording calls assume the command buffer is in the
/// recording state.
pub trait GpuDevice {
    // Memory

    /// Memory types and heaps of the physical device
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties;
    /// Allocate one backing allocation of the given memory type
    fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> VulkanResult<vk::DeviceMemory>;
    /// Free a backing allocation
    fn free_memory(&self, memory: vk::DeviceMemory);
    /// Map a whole allocation into host address space
    fn map_memory(&self, memory: vk::DeviceMemory, size: vk::DeviceSize) -> VulkanResult<*mut u8>;
    /// Unmap a previously mapped allocation
    fn unmap_memory(&self, memory: vk::DeviceMemory);

    // Buffers and images

    /// Create a buffer object without memory
    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VulkanResult<vk::Buffer>;
    /// Destroy a buffer object
    fn destroy_buffer(&self, buffer: vk::Buffer);
    /// Size, alignment and allowed memory types of a buffer
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    /// Bind a buffer to memory at an offset
    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VulkanResult<()>;
    /// Create an image object without memory
    fn create_image(&self, info: &vk::ImageCreateInfo) -> VulkanResult<vk::Image>;
    /// Destroy an image object
    fn destroy_image(&self, image: vk::Image);
    /// Size, alignment and allowed memory types of an image
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    /// Bind an image to memory at an offset
    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VulkanResult<()>;
    /// Create an image view
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VulkanResult<vk::ImageView>;
    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);
    /// Create a sampler
    fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> VulkanResult<vk::Sampler>;
    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: vk::Sampler);

    // Synchronization

    /// Create a binary semaphore
    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore>;
    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence>;
    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);
    /// Wait for a fence; `Ok(false)` when the timeout expired first
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<bool>;
    /// Return a fence to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()>;
    /// Non-blocking fence query
    fn fence_signaled(&self, fence: vk::Fence) -> VulkanResult<bool>;

    // Command buffers

    /// Allocate a primary command buffer from the device's resettable pool
    fn allocate_command_buffer(&self) -> VulkanResult<vk::CommandBuffer>;
    /// Return a command buffer to the pool
    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer);
    /// Reset a command buffer to the initial state
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;
    /// Begin recording
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, one_time_submit: bool) -> VulkanResult<()>;
    /// End recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    // Recording

    /// Begin an inline render pass, clearing the attachment when a colour is given
    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        clear: Option<[f32; 4]>,
    );
    /// End the current render pass
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    /// Clear an area of the bound colour attachment
    fn cmd_clear_colour(&self, command_buffer: vk::CommandBuffer, area: vk::Rect2D, colour: [f32; 4]);
    /// Set the dynamic viewport
    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, area: vk::Rect2D);
    /// Set the dynamic scissor
    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, area: vk::Rect2D);
    /// Bind a graphics pipeline
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    /// Bind descriptor set 0 for a graphics pipeline layout
    fn cmd_bind_descriptor_set(&self, command_buffer: vk::CommandBuffer, layout: vk::PipelineLayout, set: vk::DescriptorSet);
    /// Update push constants
    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    /// Bind vertex buffer binding 0
    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer);
    /// Bind a 16-bit index buffer
    fn cmd_bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer);
    /// Non-indexed draw of one instance
    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32);
    /// Indexed draw of one instance
    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32);
    /// Image layout transition
    fn cmd_image_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier);
    /// Copy a tightly packed buffer into the colour aspect of an image
    fn cmd_copy_buffer_to_image(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, image: vk::Image, extent: vk::Extent2D);
    /// Copy the colour aspect of an image into a tightly packed buffer
    fn cmd_copy_image_to_buffer(&self, command_buffer: vk::CommandBuffer, image: vk::Image, buffer: vk::Buffer, extent: vk::Extent2D);
    /// Copy bytes between buffers
    fn cmd_copy_buffer(&self, command_buffer: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize);

    // Passes, descriptors and pipelines

    /// Create a render pass
    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VulkanResult<vk::RenderPass>;
    /// Destroy a render pass
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    /// Create a framebuffer
    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VulkanResult<vk::Framebuffer>;
    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule>;
    /// Destroy a shader module
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    /// Create a descriptor set layout
    fn create_descriptor_set_layout(&self, info: &vk::DescriptorSetLayoutCreateInfo) -> VulkanResult<vk::DescriptorSetLayout>;
    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    /// Create a descriptor pool
    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> VulkanResult<vk::DescriptorPool>;
    /// Destroy a descriptor pool and every set allocated from it
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    /// Allocate one descriptor set
    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet>;
    /// Free one descriptor set
    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet);
    /// Point binding 0 of a set at an image view and sampler
    fn update_image_descriptor(&self, set: vk::DescriptorSet, view: vk::ImageView, sampler: vk::Sampler);
    /// Create a pipeline layout
    fn create_pipeline_layout(&self, info: &vk::PipelineLayoutCreateInfo) -> VulkanResult<vk::PipelineLayout>;
    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    /// Create one graphics pipeline
    fn create_graphics_pipeline(&self, info: &vk::GraphicsPipelineCreateInfo) -> VulkanResult<vk::Pipeline>;
    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // Queue

    /// Submit work to the graphics queue
    fn queue_submit(&self, submission: &QueueSubmission<'_>) -> VulkanResult<()>;
    /// Block until the device has no outstanding work
    fn wait_idle(&self) -> VulkanResult<()>;
}

/// First memory type allowed by `type_bits` that has every flag in `properties`
///
/// Ties are broken by the device-reported order.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count).find(|&i| {
        type_bits & (1 << i) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
    })
}

/// True if the memory type can be mapped
pub fn is_host_visible(memory_properties: &vk::PhysicalDeviceMemoryProperties, memory_type_index: u32) -> bool {
    memory_properties
        .memory_types
        .get(memory_type_index as usize)
        .is_some_and(|t| t.property_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &f) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = f;
        }
        props
    }

    #[test]
    fn test_first_matching_type_wins() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        assert_eq!(find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE), Some(1));
        assert_eq!(find_memory_type(&props, 0b100, vk::MemoryPropertyFlags::HOST_VISIBLE), Some(2));
        assert_eq!(find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL), Some(0));
    }

    #[test]
    fn test_no_matching_type() {
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE), None);
        assert_eq!(find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL), None);
        assert!(!is_host_visible(&props, 0));
    }

    #[test]
    fn test_transition_masks() {
        let barrier = ImageBarrier::transition(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(barrier.dst_access, vk::AccessFlags::TRANSFER_WRITE);
    }
}
