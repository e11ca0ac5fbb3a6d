//! # 2D Rendering Backend
//!
//! Quad batching over the [`vulkan`](crate::vulkan) layer.
//!
//! ## Architecture
//!
//! - **DeviceState**: per-device caches shared by every frame (memory pools,
//!   shaders, samplers, pipelines, textures)
//! - **RenderFrame**: one offscreen attachment, its command buffer and the
//!   semaphores chaining it to other GPU work
//! - **RenderLayer**: drawing operations over spans, plus nested transparency
//!   layers composited back into their parent
//! - **RenderContext**: acquire, draw, blit onto the swapchain image, present
//!
//! Coordinates are canvas pixels with the origin at the top left. A layer's
//! bounds place its attachment on the canvas.

// Per-device state
pub mod caches;
mod device_state;

// Drawing
pub mod gradient;
pub mod programs;
mod quad_queue;
mod render_frame;
mod render_layer;
pub mod spans;

// Frame orchestration
mod context;
mod frame_state;
mod overlay;

pub use caches::{ImageId, PipelineKind, PixelImage, ResamplingQuality};
pub use context::{DrawStatus, RenderContext};
pub use device_state::{DeviceState, LAYER_FORMAT};
pub use frame_state::{FrameState, ImmediateFrameState};
pub use gradient::{ColourStop, Gradient, GradientCache};
pub use overlay::{OverlayState, SwapchainFrame};
pub use quad_queue::QuadQueue;
pub use render_frame::RenderFrame;
pub use render_layer::{CacheRef, RenderCache, RenderLayer};
pub use spans::{RectangleList, SpanList, SpanSource};
