//! Offscreen render target with its command buffer and batching state

use ash::vk;
use std::rc::Rc;

use super::device_state::{DeviceState, LAYER_FORMAT};
use super::programs::PushConstants;
use super::quad_queue::QuadQueue;
use super::spans::SpanSource;
use crate::foundation::math::{PixelArgb, Rect};
use crate::vulkan::{
    CommandBuffer, Framebuffer, ImageCreateInfo, MemoryImage, Pipeline, Semaphore, VulkanError, VulkanResult,
};

fn rect_2d(area: Rect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: area.x, y: area.y },
        extent: vk::Extent2D {
            width: area.width.max(0) as u32,
            height: area.height.max(0) as u32,
        },
    }
}

/// One offscreen pass: attachment, framebuffer, command buffer and quads
///
/// `bounds` places the attachment in canvas pixels. Quads are given in canvas
/// pixels too; the shaders subtract the bounds origin.
///
/// By default the submission signals [`completed_semaphore`](Self::completed_semaphore)
/// and waits on nothing. Whoever consumes the attachment next waits on the
/// completed semaphore.
pub struct RenderFrame {
    quads: QuadQueue,
    command_buffer: CommandBuffer,
    framebuffer: Framebuffer,
    attachment: MemoryImage,
    completed: Semaphore,
    wait_semaphore: Option<vk::Semaphore>,
    signal_semaphore: Option<vk::Semaphore>,
    bound_pipeline: Option<vk::Pipeline>,
    bound_descriptor: Option<vk::DescriptorSet>,
    bounds: Rect,
    state: Rc<DeviceState>,
}

impl RenderFrame {
    /// Create a target covering `bounds`
    pub fn new(state: Rc<DeviceState>, bounds: Rect) -> VulkanResult<Self> {
        if bounds.is_empty() {
            return Err(VulkanError::invalid(format!("Render frame needs a non-empty area, got {bounds:?}")));
        }

        let info = ImageCreateInfo::new(bounds.width as u32, bounds.height as u32, LAYER_FORMAT)
            .color_attachment()
            .sampled()
            .transfer_src()
            .transfer_dst()
            .device_local();
        let attachment = MemoryImage::new(state.memory().framebuffers(), &info)?;

        let device = state.device().clone();
        let framebuffer = Framebuffer::new(device.clone(), state.offscreen_pass(), attachment.view(), attachment.extent())?;
        let command_buffer = CommandBuffer::new(device.clone())?;
        let completed = Semaphore::new(device)?;
        let signal_semaphore = Some(completed.handle());

        Ok(Self {
            quads: QuadQueue::new(),
            command_buffer,
            framebuffer,
            attachment,
            completed,
            wait_semaphore: None,
            signal_semaphore,
            bound_pipeline: None,
            bound_descriptor: None,
            bounds,
            state,
        })
    }

    /// Device state the frame draws with
    pub fn state(&self) -> &Rc<DeviceState> {
        &self.state
    }

    /// Canvas area covered by the attachment
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// The attachment
    pub fn attachment(&self) -> &MemoryImage {
        &self.attachment
    }

    /// The command buffer being recorded
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Semaphore owned by this frame, signaled by default on completion
    pub fn completed_semaphore(&self) -> vk::Semaphore {
        self.completed.handle()
    }

    /// Semaphore the submission waits on
    pub fn wait_semaphore(&self) -> Option<vk::Semaphore> {
        self.wait_semaphore
    }

    /// Wait on `semaphore` before drawing
    pub fn set_wait_semaphore(&mut self, semaphore: Option<vk::Semaphore>) {
        self.wait_semaphore = semaphore;
    }

    /// Semaphore the submission signals
    pub fn signal_semaphore(&self) -> Option<vk::Semaphore> {
        self.signal_semaphore
    }

    /// Signal `semaphore` instead of the completed semaphore; `None` signals nothing
    pub fn set_signal_semaphore(&mut self, semaphore: Option<vk::Semaphore>) {
        self.signal_semaphore = semaphore;
    }

    /// Signal the completed semaphore again
    pub fn signal_completed(&mut self) {
        self.signal_semaphore = Some(self.completed.handle());
    }

    /// Start recording the pass, optionally clearing the attachment to transparent
    pub fn begin_render(&mut self, clear: bool) -> VulkanResult<()> {
        self.command_buffer.reset()?;
        self.command_buffer.begin_one_time()?;

        let extent = self.attachment.extent();
        let area = Rect::with_size(
            (extent.width as i32).min(self.bounds.width),
            (extent.height as i32).min(self.bounds.height),
        );

        self.command_buffer
            .begin_render_pass(self.state.offscreen_pass(), self.framebuffer.handle(), rect_2d(area), None)?;

        if clear {
            self.command_buffer.clear_colour(rect_2d(area), [0.0; 4]);
        }

        let viewport = rect_2d(self.bounds.with_zero_origin());
        self.command_buffer.set_viewport(viewport);
        self.command_buffer.set_scissor(viewport);

        self.restore_render_state();
        Ok(())
    }

    /// Flush quads and finish recording
    pub fn end_render(&mut self) -> VulkanResult<()> {
        self.flush()?;
        self.command_buffer.end_render_pass();
        self.command_buffer.end()?;
        self.attachment.set_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        Ok(())
    }

    /// Submit the recorded pass with the current semaphores
    pub fn submit(&self, fence: Option<vk::Fence>) -> VulkanResult<()> {
        self.command_buffer
            .submit(self.wait_semaphore, self.signal_semaphore, fence)
    }

    /// Forget cached bindings and bind the quad index buffer again
    ///
    /// Call after recording commands that bypass the frame.
    pub fn restore_render_state(&mut self) {
        self.bound_pipeline = None;
        self.bound_descriptor = None;
        self.command_buffer
            .bind_index_buffer(self.state.memory().quad_index_buffer().handle());
    }

    /// Bind a pipeline unless it is already bound
    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) -> VulkanResult<()> {
        if self.bound_pipeline != Some(pipeline.handle()) {
            self.flush()?;
            self.command_buffer.bind_pipeline(pipeline.handle());
            self.bound_pipeline = Some(pipeline.handle());
            self.bound_descriptor = None;
        }
        Ok(())
    }

    /// Bind an image-sampler set unless it is already bound
    pub fn bind_descriptor(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) -> VulkanResult<()> {
        if self.bound_descriptor != Some(set) {
            self.flush()?;
            self.command_buffer.bind_descriptor_set(layout, set);
            self.bound_descriptor = Some(set);
        }
        Ok(())
    }

    /// Push constants for the following quads
    pub fn push_constants<T: PushConstants>(&mut self, layout: vk::PipelineLayout, values: &T) -> VulkanResult<()> {
        self.flush()?;
        self.command_buffer.push_constants(layout, T::STAGES, values);
        Ok(())
    }

    /// Queue one quad
    pub fn add_quad(&mut self, area: Rect, colour: PixelArgb) -> VulkanResult<()> {
        self.quads
            .add(&self.command_buffer, self.state.memory().vertices(), area, colour)
    }

    /// Queue one quad per span
    pub fn add_spans<S: SpanSource + ?Sized>(&mut self, spans: &S, colour: PixelArgb) -> VulkanResult<()> {
        self.quads
            .add_spans(&self.command_buffer, self.state.memory().vertices(), spans, colour)
    }

    /// Draw queued quads
    pub fn flush(&mut self) -> VulkanResult<()> {
        self.quads.flush(&self.command_buffer, self.state.memory().vertices())
    }

    /// Clear an area given in canvas pixels
    pub fn clear_area(&mut self, area: Rect, colour: PixelArgb) -> VulkanResult<()> {
        self.flush()?;
        let local = area
            .intersection(&self.bounds)
            .translated(-self.bounds.x, -self.bounds.y);
        if !local.is_empty() {
            let to_float = |c: u8| f32::from(c) / 255.0;
            self.command_buffer
                .clear_colour(rect_2d(local), [to_float(colour.r), to_float(colour.g), to_float(colour.b), to_float(colour.a)]);
        }
        Ok(())
    }

    /// Release per-frame vertex buffers; call once the submission has completed
    pub fn reset(&mut self) {
        self.quads.reset();
    }

    /// Vertex buffers written since the last reset
    pub fn vertex_buffer_count(&self) -> usize {
        self.quads.buffer_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::caches::PipelineKind;
    use crate::renderer::programs::ScreenBounds;
    use crate::testing::{self, Call, MockDevice};

    #[test]
    fn test_begin_clears_and_binds_indices() {
        let mock = MockDevice::new();
        let state = testing::device_state(&mock);
        let mut frame = RenderFrame::new(state.clone(), Rect::new(10, 20, 64, 32)).unwrap();
        mock.clear_calls();

        frame.begin_render(true).unwrap();
        let full = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D { width: 64, height: 32 },
        };
        let calls = mock.calls();
        assert!(calls.contains(&Call::ClearColour(full)));
        assert!(calls.contains(&Call::SetViewport(full)));
        assert!(calls.contains(&Call::BindIndexBuffer(state.memory().quad_index_buffer().handle())));
        assert!(calls.iter().any(|c| matches!(c, Call::BeginRenderPass { clear: false, .. })));
    }

    #[test]
    fn test_rebinding_same_pipeline_is_skipped() {
        let mock = MockDevice::new();
        let state = testing::device_state(&mock);
        let mut frame = RenderFrame::new(state.clone(), Rect::with_size(16, 16)).unwrap();
        let pipeline = state.layer_pipeline(PipelineKind::SolidColour).unwrap();

        frame.begin_render(false).unwrap();
        frame.bind_pipeline(&pipeline).unwrap();
        frame.bind_pipeline(&pipeline).unwrap();
        assert_eq!(mock.count(|c| matches!(c, Call::BindPipeline(_))), 1);

        frame.restore_render_state();
        frame.bind_pipeline(&pipeline).unwrap();
        assert_eq!(mock.count(|c| matches!(c, Call::BindPipeline(_))), 2);
    }

    #[test]
    fn test_push_constants_flush_pending_quads() {
        let mock = MockDevice::new();
        let state = testing::device_state(&mock);
        let mut frame = RenderFrame::new(state.clone(), Rect::with_size(16, 16)).unwrap();
        let pipeline = state.layer_pipeline(PipelineKind::SolidColour).unwrap();

        frame.begin_render(false).unwrap();
        frame.bind_pipeline(&pipeline).unwrap();
        frame.add_quad(Rect::new(0, 0, 4, 4), PixelArgb::splat(255)).unwrap();
        frame
            .push_constants(pipeline.layout(), &ScreenBounds::from_rect(frame.bounds()))
            .unwrap();

        let calls = mock.calls();
        let draw = calls.iter().position(|c| matches!(c, Call::DrawIndexed { .. })).unwrap();
        let push = calls.iter().position(|c| matches!(c, Call::PushConstants { .. })).unwrap();
        assert!(draw < push);
    }

    #[test]
    fn test_submit_uses_configured_semaphores() {
        let mock = MockDevice::new();
        let state = testing::device_state(&mock);
        let mut frame = RenderFrame::new(state, Rect::with_size(8, 8)).unwrap();
        let wait = frame.completed_semaphore();

        frame.set_wait_semaphore(Some(wait));
        frame.begin_render(true).unwrap();
        frame.end_render().unwrap();
        frame.submit(None).unwrap();

        frame.set_wait_semaphore(None);
        frame.set_signal_semaphore(None);
        frame.begin_render(true).unwrap();
        frame.end_render().unwrap();
        frame.submit(None).unwrap();

        let submits = mock.submissions();
        let n = submits.len();
        assert_eq!(submits[n - 2].wait, Some(wait));
        assert_eq!(submits[n - 2].signal, Some(frame.completed_semaphore()));
        assert_eq!(submits[n - 1].wait, None);
        assert_eq!(submits[n - 1].signal, None);
    }

    #[test]
    fn test_empty_bounds_are_rejected() {
        let mock = MockDevice::new();
        let state = testing::device_state(&mock);
        assert!(RenderFrame::new(state, Rect::new(5, 5, 0, 10)).is_err());
    }
}
