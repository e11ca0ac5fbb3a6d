//! # Configuration
//!
//! Serde configuration for the renderer, its memory pools and its texture
//! cache. Any type implementing [`Config`] can be loaded from or saved to a
//! `.toml` or `.ron` file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match extension(path) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match extension(path) {
            Some("toml") => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Sizes of the per-device memory pools, in bytes
///
/// Each value is the minimum block size of the pool; larger requests grow
/// the pool by a power-of-two block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Host-visible staging buffers for uploads and downloads
    pub staging_block_size: u64,
    /// Textures up to 64x64 pixels
    pub small_texture_block_size: u64,
    /// Textures up to 512x512 pixels
    pub medium_texture_block_size: u64,
    /// Larger textures
    pub big_texture_block_size: u64,
    /// Offscreen layer attachments
    pub framebuffer_block_size: u64,
    /// Per-flush vertex buffers
    pub vertex_block_size: u64,
    /// Minimum time between two storage minimizations
    pub minimize_interval_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            staging_block_size: 16 * MIB,
            small_texture_block_size: 4 * MIB,
            medium_texture_block_size: 8 * MIB,
            big_texture_block_size: 16 * MIB,
            framebuffer_block_size: 16 * MIB,
            vertex_block_size: 4 * MIB,
            minimize_interval_ms: 4000,
        }
    }
}

impl MemoryConfig {
    /// Interval between non-forced storage minimizations
    pub const fn minimize_interval(&self) -> Duration {
        Duration::from_millis(self.minimize_interval_ms)
    }

    /// Check every block size is usable
    pub fn validate(&self) -> Result<(), String> {
        let sizes = [
            ("staging", self.staging_block_size),
            ("small texture", self.small_texture_block_size),
            ("medium texture", self.medium_texture_block_size),
            ("big texture", self.big_texture_block_size),
            ("framebuffer", self.framebuffer_block_size),
            ("vertex", self.vertex_block_size),
        ];

        for (name, size) in sizes {
            if size == 0 {
                return Err(format!("{name} block size must be greater than zero"));
            }
        }
        Ok(())
    }
}

/// Texture cache behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureCacheConfig {
    /// Unreferenced textures younger than this stay resident
    pub eviction_age_ms: u64,
    /// Descriptor sets available for sampled images
    pub descriptor_pool_size: u32,
}

impl Default for TextureCacheConfig {
    fn default() -> Self {
        Self {
            eviction_age_ms: 1000,
            descriptor_pool_size: 256,
        }
    }
}

impl TextureCacheConfig {
    /// Minimum idle age before eviction
    pub const fn eviction_age(&self) -> Duration {
        Duration::from_millis(self.eviction_age_ms)
    }
}

/// # Renderer Configuration
///
/// Frame pacing, synchronization timeouts and resource locations for a
/// [`RenderContext`](crate::RenderContext) and its device state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance
    pub application_name: String,
    /// Frame-in-flight slots; 1 serializes frames
    pub max_frames_in_flight: usize,
    /// Bounded wait on a slot fence before a frame is reported failed
    pub fence_timeout_ms: u64,
    /// Timeout handed to the presentation engine when acquiring an image
    pub acquire_timeout_ms: u64,
    /// Directory searched for `<name>.spv` shader binaries
    pub shader_directory: Option<PathBuf>,
    /// Memory pool sizes
    pub memory: MemoryConfig,
    /// Texture cache behaviour
    pub textures: TextureCacheConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("vulkan_canvas")
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Create a configuration with default values
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            max_frames_in_flight: 1,
            fence_timeout_ms: 1000,
            acquire_timeout_ms: 1000,
            shader_directory: None,
            memory: MemoryConfig::default(),
            textures: TextureCacheConfig::default(),
        }
    }

    /// Set the number of frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Set the fence wait timeout
    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the shader search directory
    pub fn with_shader_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.shader_directory = Some(directory.into());
        self
    }

    /// Set the memory pool sizes
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Fence wait timeout in nanoseconds, as Vulkan expects it
    pub const fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms.saturating_mul(1_000_000)
    }

    /// Acquire timeout in nanoseconds
    pub const fn acquire_timeout_ns(&self) -> u64 {
        self.acquire_timeout_ms.saturating_mul(1_000_000)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frames_in_flight == 0 || self.max_frames_in_flight > 8 {
            return Err(ConfigError::Invalid(
                "max_frames_in_flight must be between 1 and 8".to_string(),
            ));
        }
        if self.fence_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fence_timeout_ms must be greater than zero".to_string()));
        }
        self.memory.validate().map_err(ConfigError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vulkan_canvas_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_frames_in_flight, 1);
        assert_eq!(config.fence_timeout_ns(), 1_000_000_000);
        assert_eq!(config.memory.vertex_block_size, 4 * MIB);
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        assert!(RendererConfig::default().with_frames_in_flight(0).validate().is_err());
        assert!(RendererConfig::default().with_frames_in_flight(9).validate().is_err());
        assert!(RendererConfig::default().with_frames_in_flight(3).validate().is_ok());
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let memory = MemoryConfig { vertex_block_size: 0, ..MemoryConfig::default() };
        let err = RendererConfig::default().with_memory(memory).validate().unwrap_err();
        assert!(err.to_string().contains("vertex"));
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let path = temp_path("renderer.toml");
        let config = RendererConfig::new("demo")
            .with_frames_in_flight(2)
            .with_shader_directory("shaders");

        config.save_to_file(&path).unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_partial_file_uses_defaults() {
        let path = temp_path("renderer.ron");
        std::fs::write(&path, "(max_frames_in_flight: 2)").unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.max_frames_in_flight, 2);
        assert_eq!(loaded.textures, TextureCacheConfig::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let result = RendererConfig::default().save_to_file(temp_path("renderer.json"));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
