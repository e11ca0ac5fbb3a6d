//! Frame-level render state: the root layer and its per-frame cache

use ash::vk;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::device_state::DeviceState;
use super::render_layer::{RenderCache, RenderLayer};
use crate::foundation::math::Rect;
use crate::vulkan::{Fence, ImageTransfer, VulkanResult};

const IDLE_STEP: Duration = Duration::from_millis(10);
const IDLE_ATTEMPTS: u32 = 100;

/// Root layer of a frame plus everything its GPU work borrows
pub struct FrameState {
    layer: RenderLayer,
    cache: Rc<RefCell<RenderCache>>,
}

impl FrameState {
    /// Create a frame covering `bounds`
    pub fn new(state: Rc<DeviceState>, bounds: Rect) -> VulkanResult<Self> {
        let cache = Rc::new(RefCell::new(RenderCache::new()));
        Ok(Self {
            layer: RenderLayer::new(state, bounds, cache.clone())?,
            cache,
        })
    }

    /// Root layer
    pub fn layer(&self) -> &RenderLayer {
        &self.layer
    }

    /// Root layer, for drawing
    pub fn layer_mut(&mut self) -> &mut RenderLayer {
        &mut self.layer
    }

    /// Per-frame cache shared with nested layers
    pub fn cache(&self) -> &Rc<RefCell<RenderCache>> {
        &self.cache
    }

    /// Release everything the previous use of this frame borrowed
    ///
    /// Only call once that use's GPU work has completed.
    pub fn reset(&mut self) {
        self.cache.borrow_mut().reset();
        self.layer.frame_mut().reset();
    }
}

/// A frame rendered and waited for synchronously, without semaphores
///
/// Used for offscreen rendering: draw, [`flush_render`](Self::flush_render),
/// then read the attachment back with [`read_pixels`](Self::read_pixels).
pub struct ImmediateFrameState {
    frame: FrameState,
    fence: Fence,
    timeout_ns: u64,
}

impl ImmediateFrameState {
    /// Create a frame covering `bounds`
    pub fn new(state: Rc<DeviceState>, bounds: Rect) -> VulkanResult<Self> {
        let timeout_ns = state.config().fence_timeout_ns();
        let fence = Fence::new(state.device().clone(), true)?;
        Ok(Self {
            frame: FrameState::new(state, bounds)?,
            fence,
            timeout_ns,
        })
    }

    /// Wait for the previous render, then start recording a cleared frame
    ///
    /// Returns `false` if the previous render did not finish in time.
    pub fn start_render(&mut self) -> VulkanResult<bool> {
        if !self.fence.wait(self.timeout_ns)? {
            log::warn!("Immediate frame still busy, skipping render");
            return Ok(false);
        }

        self.frame.reset();
        let layer = self.frame.layer_mut();
        layer.set_wait_semaphore(None);
        layer.frame_mut().set_signal_semaphore(None);
        layer.begin_render(true)?;
        Ok(true)
    }

    /// Root layer, for drawing
    pub fn layer_mut(&mut self) -> &mut RenderLayer {
        self.frame.layer_mut()
    }

    /// Finish, submit and wait for the frame
    ///
    /// Falls back to waiting for the whole device if the fence times out.
    pub fn flush_render(&mut self) -> VulkanResult<()> {
        let layer = self.frame.layer_mut();
        layer.end_render()?;

        self.fence.reset()?;
        layer.submit(Some(self.fence.handle()))?;

        if !self.fence.wait(self.timeout_ns)? {
            log::warn!("Immediate frame fence timed out, waiting for device idle");
            self.frame.layer().frame().state().device().wait_idle()?;
        }
        Ok(())
    }

    /// Copy the rendered attachment back to host memory as BGRA8 rows
    pub fn read_pixels(&mut self) -> VulkanResult<Vec<u8>> {
        let frame = self.frame.layer().frame();
        let attachment = frame.attachment();
        let extent = attachment.extent();

        let mut transfer = ImageTransfer::new(frame.state().device().clone(), frame.state().memory().staging(), extent)?;
        transfer.copy_image_to_buffer(attachment)?;
        transfer.wait()?;

        let mut pixels = vec![0; extent.width as usize * extent.height as usize * 4];
        transfer.read_pixels(&mut pixels)?;
        Ok(pixels)
    }

    /// Attachment size
    pub fn extent(&self) -> vk::Extent2D {
        self.frame.layer().frame().attachment().extent()
    }
}

impl Drop for ImmediateFrameState {
    fn drop(&mut self) {
        if !matches!(self.fence.is_signaled(), Ok(true)) {
            if let Err(err) = self.fence.wait_idle(IDLE_STEP, IDLE_ATTEMPTS) {
                log::error!("Immediate frame dropped while busy: {err}");
            }
        }
    }
}
