//! Frame orchestration: acquire, draw, blit, present

use ash::vk;
use std::rc::Rc;

use super::device_state::DeviceState;
use super::frame_state::FrameState;
use super::overlay::{OverlayState, SwapchainFrame};
use super::render_layer::RenderLayer;
use crate::foundation::math::Rect;
use crate::vulkan::{
    AcquireOutcome, Fence, PresentOutcome, PresentationEngine, QueueSubmission, Semaphore, VulkanResult,
    DEFAULT_WAIT_STAGE,
};

/// Outcome of [`RenderContext::draw_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStatus {
    /// Nothing was presented; the next call may succeed
    HasFailed,
    /// The frame was presented
    HasFinished,
    /// The swapchain must be recreated before drawing again
    NeedsSwapchainRecreation,
}

/// Resources of one frame in flight
struct FrameSlot {
    frame: FrameState,
    overlay: OverlayState,
    image_acquired: Semaphore,
    completed_fence: Fence,
}

impl FrameSlot {
    fn new(state: &Rc<DeviceState>, bounds: Rect, swapchain_pass: vk::RenderPass) -> VulkanResult<Self> {
        let device = state.device().clone();
        Ok(Self {
            frame: FrameState::new(state.clone(), bounds)?,
            overlay: OverlayState::new(state.clone(), swapchain_pass)?,
            image_acquired: Semaphore::new(device.clone())?,
            completed_fence: Fence::new(device, true)?,
        })
    }
}

/// Renders frames into a presentation engine
///
/// Each frame draws into an offscreen layer, blits it onto the acquired
/// swapchain image and presents it. Up to `max_frames_in_flight` frames run
/// concurrently, each in its own slot guarded by a fence.
pub struct RenderContext<P: PresentationEngine> {
    slots: Vec<FrameSlot>,
    swapchain_frames: Vec<SwapchainFrame>,
    presenter: P,
    state: Rc<DeviceState>,
    current_slot: usize,
    frame_counter: u64,
}

impl<P: PresentationEngine> RenderContext<P> {
    /// Create the frame slots for the presenter's current swapchain
    pub fn new(state: Rc<DeviceState>, presenter: P) -> VulkanResult<Self> {
        let mut context = Self {
            slots: Vec::new(),
            swapchain_frames: Vec::new(),
            presenter,
            state,
            current_slot: 0,
            frame_counter: 0,
        };
        context.rebuild_targets()?;
        Ok(context)
    }

    /// Shared device state
    pub fn device_state(&self) -> &Rc<DeviceState> {
        &self.state
    }

    /// The presentation engine
    pub fn presentation_engine(&self) -> &P {
        &self.presenter
    }

    /// The presentation engine, for window-size updates
    pub fn presentation_engine_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Frames presented so far
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Slot the next frame uses
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Number of slots
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Wait for the device, rebuild the swapchain and every target sized from it
    pub fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        self.state.device().wait_idle()?;
        self.presenter.recreate()?;
        self.rebuild_targets()
    }

    /// Build slots and swapchain targets, then release memory the old ones held
    fn rebuild_targets(&mut self) -> VulkanResult<()> {
        self.state.device().wait_idle()?;
        self.slots.clear();
        self.swapchain_frames.clear();

        let extent = self.presenter.extent();
        let pass = self.state.swapchain_pass(self.presenter.format())?;
        let bounds = Rect::with_size(extent.width as i32, extent.height as i32);

        for _ in 0..self.state.config().max_frames_in_flight {
            self.slots.push(FrameSlot::new(&self.state, bounds, pass)?);
        }
        for &view in self.presenter.image_views() {
            self.swapchain_frames.push(SwapchainFrame::new(&self.state, pass, view, extent)?);
        }

        self.current_slot = 0;
        log::info!(
            "Render targets built: {}x{}, {} slots, {} swapchain images",
            extent.width,
            extent.height,
            self.slots.len(),
            self.swapchain_frames.len()
        );

        self.state.minimize_storage(true);
        Ok(())
    }

    /// Draw one frame with `draw` and present it
    ///
    /// `draw` receives the frame's root layer, already cleared. The slot
    /// only advances once the frame has been presented.
    pub fn draw_frame<F>(&mut self, draw: F) -> DrawStatus
    where
        F: FnOnce(&mut RenderLayer) -> VulkanResult<()>,
    {
        match self.try_draw_frame(draw) {
            Ok(status) => status,
            Err(err) => {
                log::error!("Frame {} failed: {err}", self.frame_counter);
                DrawStatus::HasFailed
            }
        }
    }

    fn try_draw_frame<F>(&mut self, draw: F) -> VulkanResult<DrawStatus>
    where
        F: FnOnce(&mut RenderLayer) -> VulkanResult<()>,
    {
        let timeout_ns = self.state.config().fence_timeout_ns();
        let acquire_timeout_ns = self.state.config().acquire_timeout_ns();
        let slot = &mut self.slots[self.current_slot];

        if !slot.completed_fence.wait(timeout_ns)? {
            log::warn!("Slot {} still busy after {timeout_ns} ns", self.current_slot);
            return Ok(DrawStatus::HasFailed);
        }

        let acquired = slot.image_acquired.handle();
        let image_index = match self.presenter.acquire_next_image(acquired, acquire_timeout_ns) {
            AcquireOutcome::Ready(index) => index,
            AcquireOutcome::Suboptimal => {
                // The image was acquired anyway; consume the semaphore it signaled.
                self.state.device().queue_submit(&QueueSubmission {
                    command_buffers: &[],
                    wait: Some((acquired, DEFAULT_WAIT_STAGE)),
                    signal: None,
                    fence: None,
                })?;
                return Ok(DrawStatus::NeedsSwapchainRecreation);
            }
            AcquireOutcome::OutOfDate => return Ok(DrawStatus::NeedsSwapchainRecreation),
            AcquireOutcome::Failed(result) => {
                log::warn!("Failed to acquire swapchain image: {result}");
                return Ok(DrawStatus::HasFailed);
            }
        };

        let Some(target) = self.swapchain_frames.get(image_index as usize) else {
            log::error!("Presenter returned image {image_index} of {}", self.swapchain_frames.len());
            return Ok(DrawStatus::NeedsSwapchainRecreation);
        };

        slot.completed_fence.reset()?;
        slot.frame.reset();
        self.state.sweep_textures();

        // From here on the fence must be signaled by some submission.
        let layer = slot.frame.layer_mut();
        layer.set_wait_semaphore(Some(acquired));
        layer.frame_mut().signal_completed();

        if let Err(err) = layer.begin_render(true) {
            Self::recover(slot, acquired)?;
            return Err(err);
        }

        if let Err(err) = draw(&mut *layer) {
            log::warn!("Frame drawing failed: {err}");
            if layer.end_render().is_err() {
                log::debug!("Could not close the failed frame's recording");
            }
            Self::recover(slot, Self::unconsumed(slot, acquired))?;
            return Ok(DrawStatus::HasFailed);
        }

        let submitted = layer.end_render().and_then(|()| layer.submit(None));
        if let Err(err) = submitted {
            Self::recover(slot, Self::unconsumed(slot, acquired))?;
            return Err(err);
        }

        let frame_done = layer.frame().completed_semaphore();
        let attachment = layer.frame().attachment();
        let (source, source_extent) = (attachment.view(), attachment.extent());

        let blitted = slot
            .overlay
            .record(target, source, source_extent, false)
            .and_then(|()| slot.overlay.submit(frame_done, slot.completed_fence.handle()));
        if let Err(err) = blitted {
            Self::recover(slot, frame_done)?;
            return Err(err);
        }

        match self.presenter.present(image_index, slot.overlay.completed_semaphore()) {
            PresentOutcome::Presented => {}
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => {
                return Ok(DrawStatus::NeedsSwapchainRecreation);
            }
            PresentOutcome::Failed(result) => {
                log::warn!("Failed to present swapchain image: {result}");
                return Ok(DrawStatus::HasFailed);
            }
        }

        self.current_slot = (self.current_slot + 1) % self.slots.len();
        self.frame_counter += 1;
        Ok(DrawStatus::HasFinished)
    }

    /// Semaphore signaled last by submitted work but not yet waited on
    ///
    /// Nested layers chain from the acquire semaphore, so the newest
    /// submitted layer holds the end of the chain.
    fn unconsumed(slot: &FrameSlot, acquired: vk::Semaphore) -> vk::Semaphore {
        slot.frame.cache().borrow().pending_wait().unwrap_or(acquired)
    }

    /// Signal the slot fence with an empty submission consuming `pending`
    fn recover(slot: &FrameSlot, pending: vk::Semaphore) -> VulkanResult<()> {
        slot.frame.layer().frame().state().device().queue_submit(&QueueSubmission {
            command_buffers: &[],
            wait: Some((pending, DEFAULT_WAIT_STAGE)),
            signal: None,
            fence: Some(slot.completed_fence.handle()),
        })
    }
}

impl<P: PresentationEngine> Drop for RenderContext<P> {
    fn drop(&mut self) {
        if let Err(err) = self.state.device().wait_idle() {
            log::error!("Device wait failed while releasing render context: {err}");
        }
    }
}
