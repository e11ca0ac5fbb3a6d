//! Error types for the Vulkan layer

use ash::vk;
use thiserror::Error;

/// Errors raised by device calls, the memory allocator and the renderer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VulkanError {
    /// A device call returned a failure code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// No memory type satisfies the resource's type mask and the requested properties
    #[error("No suitable memory type found (type bits {type_bits:#b}, properties {properties:?})")]
    NoSuitableMemoryType {
        /// Allowed memory type mask reported by the resource
        type_bits: u32,
        /// Requested property flags
        properties: vk::MemoryPropertyFlags,
    },

    /// A disposed range does not belong to any block of the pool
    #[error("Memory range not found: block {block}, offset {offset}, size {size}")]
    RangeNotFound {
        /// Owning block identifier
        block: u64,
        /// Offset within the block
        offset: u64,
        /// Size of the range
        size: u64,
    },

    /// A freshly grown block could not satisfy the request it was sized for
    #[error("New memory block of {block_size} bytes cannot hold {requested} bytes")]
    BlockAllocationFailed {
        /// Size of the new block
        block_size: u64,
        /// Requested range size
        requested: u64,
    },

    /// Host access to memory that is not host visible, or outside the lease
    #[error("Memory is not host accessible: {reason}")]
    NotHostVisible {
        /// What was attempted
        reason: String,
    },

    /// The call is not valid in the current state
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Why the call was rejected
        reason: String,
    },

    /// A shader module was requested by name but never loaded
    #[error("Shader not found: {0}")]
    ShaderNotFound(String),

    /// Reading shader binaries failed
    #[error("IO error: {0}")]
    Io(String),

    /// Device or swapchain setup failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
}

impl VulkanError {
    /// Shorthand for [`VulkanError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

impl From<std::io::Error> for VulkanError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
