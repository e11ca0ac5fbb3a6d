//! Command buffer recording and chained one-shot submissions

use ash::vk;
use std::time::Duration;

use super::{DeviceRef, Fence, ImageBarrier, QueueSubmission, Semaphore, VulkanError, VulkanResult};

/// Stage at which every chained submission waits for its predecessor
///
/// Chained work samples, copies and renders to what came before, so nothing
/// in the waiting submission may start early.
pub const DEFAULT_WAIT_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::ALL_COMMANDS;

/// Primary command buffer with RAII cleanup and a tracked recording state
pub struct CommandBuffer {
    device: DeviceRef,
    command_buffer: vk::CommandBuffer,
    recording: bool,
}

impl CommandBuffer {
    /// Allocate a new command buffer from the device pool
    pub fn new(device: DeviceRef) -> VulkanResult<Self> {
        let command_buffer = device.allocate_command_buffer()?;
        Ok(Self { device, command_buffer, recording: false })
    }

    /// Get the command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// True between `begin` and `end`
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Return to the initial state, discarding any recorded commands
    pub fn reset(&mut self) -> VulkanResult<()> {
        self.device.reset_command_buffer(self.command_buffer)?;
        self.recording = false;
        Ok(())
    }

    /// Begin command recording
    pub fn begin(&mut self) -> VulkanResult<()> {
        self.begin_with(false)
    }

    /// Begin recording for a single submission
    pub fn begin_one_time(&mut self) -> VulkanResult<()> {
        self.begin_with(true)
    }

    fn begin_with(&mut self, one_time_submit: bool) -> VulkanResult<()> {
        if self.recording {
            return Err(VulkanError::invalid("Command buffer already recording"));
        }

        self.device.begin_command_buffer(self.command_buffer, one_time_submit)?;
        self.recording = true;
        Ok(())
    }

    /// End command recording
    pub fn end(&mut self) -> VulkanResult<()> {
        if !self.recording {
            return Err(VulkanError::invalid("Command buffer not recording"));
        }

        self.device.end_command_buffer(self.command_buffer)?;
        self.recording = false;
        Ok(())
    }

    /// Begin an inline render pass
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        clear: Option<[f32; 4]>,
    ) -> VulkanResult<()> {
        if !self.recording {
            return Err(VulkanError::invalid("Command buffer not recording"));
        }

        self.device
            .cmd_begin_render_pass(self.command_buffer, render_pass, framebuffer, area, clear);
        Ok(())
    }

    /// End the current render pass
    pub fn end_render_pass(&self) {
        self.device.cmd_end_render_pass(self.command_buffer);
    }

    /// Clear part of the bound attachment
    pub fn clear_colour(&self, area: vk::Rect2D, colour: [f32; 4]) {
        self.device.cmd_clear_colour(self.command_buffer, area, colour);
    }

    /// Set viewport
    pub fn set_viewport(&self, area: vk::Rect2D) {
        self.device.cmd_set_viewport(self.command_buffer, area);
    }

    /// Set scissor
    pub fn set_scissor(&self, area: vk::Rect2D) {
        self.device.cmd_set_scissor(self.command_buffer, area);
    }

    /// Bind graphics pipeline
    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        self.device.cmd_bind_pipeline(self.command_buffer, pipeline);
    }

    /// Bind descriptor set 0
    pub fn bind_descriptor_set(&self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        self.device.cmd_bind_descriptor_set(self.command_buffer, layout, set);
    }

    /// Push a plain-old-data block at offset 0
    pub fn push_constants<T: bytemuck::Pod>(&self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, values: &T) {
        self.device
            .cmd_push_constants(self.command_buffer, layout, stages, 0, bytemuck::bytes_of(values));
    }

    /// Bind vertex buffer
    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        self.device.cmd_bind_vertex_buffer(self.command_buffer, buffer);
    }

    /// Bind 16-bit index buffer
    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        self.device.cmd_bind_index_buffer(self.command_buffer, buffer);
    }

    /// Draw
    pub fn draw(&self, vertex_count: u32) {
        self.device.cmd_draw(self.command_buffer, vertex_count);
    }

    /// Draw indexed
    pub fn draw_indexed(&self, index_count: u32) {
        self.device.cmd_draw_indexed(self.command_buffer, index_count);
    }

    /// Transition an image between layouts
    pub fn transition_image_layout(&self, image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) {
        let barrier = ImageBarrier::transition(image, old_layout, new_layout);
        self.device.cmd_image_barrier(self.command_buffer, &barrier);
    }

    /// Copy a staging buffer into an image
    pub fn copy_buffer_to_image(&self, buffer: vk::Buffer, image: vk::Image, extent: vk::Extent2D) {
        self.device
            .cmd_copy_buffer_to_image(self.command_buffer, buffer, image, extent);
    }

    /// Copy an image into a staging buffer
    pub fn copy_image_to_buffer(&self, image: vk::Image, buffer: vk::Buffer, extent: vk::Extent2D) {
        self.device
            .cmd_copy_image_to_buffer(self.command_buffer, image, buffer, extent);
    }

    /// Copy between buffers
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        self.device.cmd_copy_buffer(self.command_buffer, src, dst, size);
    }

    /// Submit with optional single wait/signal semaphores and fence
    pub fn submit(
        &self,
        wait: Option<vk::Semaphore>,
        signal: Option<vk::Semaphore>,
        fence: Option<vk::Fence>,
    ) -> VulkanResult<()> {
        if self.recording {
            return Err(VulkanError::invalid("Cannot submit a command buffer that is still recording"));
        }

        let command_buffers = [self.command_buffer];
        self.device.queue_submit(&QueueSubmission {
            command_buffers: &command_buffers,
            wait: wait.map(|s| (s, DEFAULT_WAIT_STAGE)),
            signal,
            fence,
        })
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.command_buffer);
    }
}

/// One-shot submissions chained by semaphores
///
/// Each [`submit`](Self::submit) records a fresh command buffer, waits on the
/// semaphore signaled by the previous submission and signals a new one, so
/// the submissions execute in order without any CPU wait. Command buffers and
/// semaphores are kept alive for the lifetime of the sequence.
pub struct CommandSequence {
    device: DeviceRef,
    command_buffers: Vec<CommandBuffer>,
    semaphores: Vec<Semaphore>,
    completed_fence: Fence,
    fence_in_use: bool,
}

impl CommandSequence {
    /// Create an empty sequence with an unsignaled completion fence
    pub fn new(device: DeviceRef) -> VulkanResult<Self> {
        let completed_fence = Fence::new(device.clone(), false)?;
        Ok(Self {
            device,
            command_buffers: Vec::new(),
            semaphores: Vec::new(),
            completed_fence,
            fence_in_use: false,
        })
    }

    /// Semaphore the next submission will wait on
    pub fn current_wait_semaphore(&self) -> Option<vk::Semaphore> {
        self.semaphores.last().map(Semaphore::handle)
    }

    /// Fence signaled by the last fenced submission
    pub fn completed_fence(&self) -> &Fence {
        &self.completed_fence
    }

    /// True once the last fenced submission has completed, or if none is pending
    pub fn is_complete(&self) -> VulkanResult<bool> {
        if self.fence_in_use {
            self.completed_fence.is_signaled()
        } else {
            Ok(true)
        }
    }

    /// Record commands and submit them after every earlier submission
    ///
    /// With `use_fence` the completion fence is attached, after waiting for
    /// any earlier use of it to finish.
    pub fn submit<F>(&mut self, record: F, use_fence: bool) -> VulkanResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        let mut command_buffer = CommandBuffer::new(self.device.clone())?;
        command_buffer.begin_one_time()?;
        record(&command_buffer);
        command_buffer.end()?;

        let wait = self.current_wait_semaphore();
        let signal = Semaphore::new(self.device.clone())?;

        let fence = if use_fence {
            self.wait_for_fence(Duration::from_millis(10))?;
            self.completed_fence.reset()?;
            Some(self.completed_fence.handle())
        } else {
            None
        };

        command_buffer.submit(wait, Some(signal.handle()), fence)?;

        if use_fence {
            self.fence_in_use = true;
        }

        self.command_buffers.push(command_buffer);
        self.semaphores.push(signal);
        Ok(())
    }

    /// Block until the last fenced submission completes
    pub fn wait_for_fence(&mut self, step: Duration) -> VulkanResult<()> {
        if !self.fence_in_use {
            return Ok(());
        }

        self.completed_fence.wait_idle(step, 100)?;
        self.fence_in_use = false;
        Ok(())
    }
}
