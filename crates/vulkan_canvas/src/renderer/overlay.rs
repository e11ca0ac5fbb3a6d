//! Final blit of a frame attachment onto a swapchain image

use ash::vk;
use std::rc::Rc;

use super::caches::PipelineKind;
use super::device_state::DeviceState;
use super::programs::{OverlayPushConstants, OverlayVertex, PushConstants};
use crate::foundation::math::Rect;
use crate::vulkan::{
    BufferCreateInfo, CommandBuffer, Framebuffer, ImageDescriptor, MemoryBuffer, Semaphore,
    VulkanResult,
};

const BACKGROUND: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

/// Framebuffer over one swapchain image
pub struct SwapchainFrame {
    framebuffer: Framebuffer,
}

impl SwapchainFrame {
    /// Wrap `view` for the swapchain pass
    pub fn new(state: &DeviceState, render_pass: vk::RenderPass, view: vk::ImageView, extent: vk::Extent2D) -> VulkanResult<Self> {
        Ok(Self {
            framebuffer: Framebuffer::new(state.device().clone(), render_pass, view, extent)?,
        })
    }

    /// Framebuffer handle
    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer.handle()
    }

    /// Image size
    pub fn extent(&self) -> vk::Extent2D {
        self.framebuffer.extent()
    }
}

/// Per-slot overlay pass: command buffer, strip vertices and descriptor
pub struct OverlayState {
    descriptor: Option<ImageDescriptor>,
    vertices: MemoryBuffer,
    command_buffer: CommandBuffer,
    completed: Semaphore,
    render_pass: vk::RenderPass,
    state: Rc<DeviceState>,
}

impl OverlayState {
    /// Create the pass resources for swapchain images in `render_pass`
    pub fn new(state: Rc<DeviceState>, render_pass: vk::RenderPass) -> VulkanResult<Self> {
        let device = state.device().clone();
        let vertices = MemoryBuffer::new(
            state.memory().vertices(),
            &BufferCreateInfo::for_elements::<OverlayVertex>(4)
                .vertex_buffer()
                .host_visible(),
        )?;

        Ok(Self {
            descriptor: None,
            vertices,
            command_buffer: CommandBuffer::new(device.clone())?,
            completed: Semaphore::new(device)?,
            render_pass,
            state,
        })
    }

    /// Signaled once the swapchain image is written
    pub fn completed_semaphore(&self) -> vk::Semaphore {
        self.completed.handle()
    }

    /// Record the blit of `source` covering the whole of `target`
    ///
    /// With `flip`, the source is drawn upside down.
    pub fn record(&mut self, target: &SwapchainFrame, source: vk::ImageView, source_extent: vk::Extent2D, flip: bool) -> VulkanResult<()> {
        let extent = target.extent();
        let full = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };

        self.command_buffer.reset()?;
        self.command_buffer.begin_one_time()?;
        self.command_buffer
            .begin_render_pass(self.render_pass, target.framebuffer(), full, Some(BACKGROUND))?;
        self.command_buffer.set_viewport(full);
        self.command_buffer.set_scissor(full);

        let set = self.update_descriptor(source)?;
        let pipeline = self.state.pipeline(PipelineKind::Overlay, self.render_pass)?;
        self.command_buffer.bind_pipeline(pipeline.handle());
        self.command_buffer.bind_descriptor_set(pipeline.layout(), set);

        let constants = OverlayPushConstants {
            screen_size: [extent.width as f32, extent.height as f32],
            texture_bounds: [
                0.0,
                0.0,
                extent.width as f32 / source_extent.width.max(1) as f32,
                extent.height as f32 / source_extent.height.max(1) as f32,
            ],
            v_offset_and_scale: if flip { [1.0, -1.0] } else { [0.0, 1.0] },
        };
        self.command_buffer
            .push_constants(pipeline.layout(), OverlayPushConstants::STAGES, &constants);

        let screen = Rect::with_size(extent.width as i32, extent.height as i32);
        self.vertices.write_slice(&OverlayVertex::strip(screen))?;
        self.command_buffer.bind_vertex_buffer(self.vertices.handle());
        self.command_buffer.draw(4);

        self.command_buffer.end_render_pass();
        self.command_buffer.end()
    }

    fn update_descriptor(&mut self, source: vk::ImageView) -> VulkanResult<vk::DescriptorSet> {
        let sampler = self.state.samplers().copy();
        if let Some(descriptor) = &self.descriptor {
            descriptor.update(source, sampler);
            return Ok(descriptor.handle());
        }

        let descriptor = ImageDescriptor::new(self.state.descriptor_pool(), source, sampler)?;
        let set = descriptor.handle();
        self.descriptor = Some(descriptor);
        Ok(set)
    }

    /// Submit after `wait`, signaling the completed semaphore and `fence`
    pub fn submit(&self, wait: vk::Semaphore, fence: vk::Fence) -> VulkanResult<()> {
        self.command_buffer
            .submit(Some(wait), Some(self.completed.handle()), Some(fence))
    }
}
