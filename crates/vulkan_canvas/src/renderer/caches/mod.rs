//! Per-device caches shared by every frame

mod memory;
mod pipelines;
mod samplers;
mod shaders;
mod textures;

pub use memory::{CachedMemory, MAX_QUADS};
pub use pipelines::{PipelineKind, Pipelines};
pub use samplers::{ResamplingQuality, Samplers};
pub use shaders::ShaderCache;
pub use textures::{ImageId, PixelImage, Texture, TextureCache};
