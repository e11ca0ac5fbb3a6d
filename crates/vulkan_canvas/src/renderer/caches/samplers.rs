//! Samplers for each resampling quality

use crate::vulkan::{DeviceRef, Sampler, VulkanResult};
use ash::vk;

/// How images are filtered when drawn scaled or transformed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResamplingQuality {
    /// Nearest neighbour
    Low,
    /// Bilinear
    #[default]
    Medium,
    /// Bilinear; reserved for a higher quality filter
    High,
}

impl ResamplingQuality {
    /// Every quality, in descriptor slot order
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Descriptor slot used for this quality
    pub const fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }
}

/// The device's samplers
pub struct Samplers {
    low: Sampler,
    medium: Sampler,
    high: Sampler,
    copy: Sampler,
}

impl Samplers {
    /// Create all samplers
    pub fn new(device: &DeviceRef) -> VulkanResult<Self> {
        Ok(Self {
            low: Sampler::new(device.clone(), vk::Filter::NEAREST)?,
            medium: Sampler::new(device.clone(), vk::Filter::LINEAR)?,
            high: Sampler::new(device.clone(), vk::Filter::LINEAR)?,
            copy: Sampler::copy(device.clone())?,
        })
    }

    /// Sampler for a resampling quality
    pub fn for_quality(&self, quality: ResamplingQuality) -> vk::Sampler {
        match quality {
            ResamplingQuality::Low => self.low.handle(),
            ResamplingQuality::Medium => self.medium.handle(),
            ResamplingQuality::High => self.high.handle(),
        }
    }

    /// Bilinear sampler used for layers and gradient lookups
    pub fn linear(&self) -> vk::Sampler {
        self.medium.handle()
    }

    /// Nearest sampler returning transparent black outside the image
    pub fn copy(&self) -> vk::Sampler {
        self.copy.handle()
    }
}
