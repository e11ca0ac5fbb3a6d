//! Foundation utilities shared by the Vulkan layer and the renderer

pub mod logging;
pub mod math;
pub mod time;
