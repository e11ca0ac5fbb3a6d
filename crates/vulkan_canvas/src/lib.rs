//! # Vulkan Canvas
//!
//! A thin Vulkan wrapper with a device memory sub-allocator, and a layered 2D
//! rendering backend built on top of it.
//!
//! ## Layout
//!
//! - [`vulkan`]: device seam, RAII handles, command recording, swapchain access
//!   and the range/block/pool memory allocator
//! - [`renderer`]: per-device caches, quad batching render layers with nested
//!   transparency layers, and the frame orchestration of [`RenderContext`]
//! - [`config`]: serde configuration loaded from `.toml` or `.ron` files
//! - [`foundation`]: logging, math and clock utilities
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vulkan_canvas::prelude::*;
//!
//! fn frame(context: &mut RenderContext<impl PresentationEngine>) -> DrawStatus {
//!     context.draw_frame(|layer| {
//!         let area = Rect::new(10, 10, 200, 100);
//!         layer.fill_solid(&RectangleList::from(area), PixelArgb::new(255, 40, 80, 200))
//!     })
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod renderer;
pub mod vulkan;

#[cfg(test)]
pub(crate) mod testing;

pub use renderer::{DrawStatus, RenderContext};

/// Common imports for canvas users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, MemoryConfig, RendererConfig, TextureCacheConfig},
        foundation::{
            math::{AffineTransform, PixelArgb, Point, Rect},
            time::{Clock, ManualClock, MonotonicClock},
        },
        renderer::{
            DeviceState, DrawStatus, FrameState, Gradient, ImageId, ImmediateFrameState, PixelImage,
            RectangleList, RenderContext, RenderLayer, ResamplingQuality, SpanList, SpanSource,
        },
        vulkan::{
            DeviceRef, GpuDevice, MemoryBlock, MemoryPool, MemoryRange, PresentationEngine,
            VulkanError, VulkanResult,
        },
    };
}
