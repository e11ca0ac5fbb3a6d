//! Samplers, descriptor set layouts, pools and image-sampler sets
//!
//! Every textured draw in the canvas binds exactly one combined image
//! sampler at binding 0 of set 0, so one layout shape serves every pipeline.

use ash::vk;
use std::rc::Rc;

use super::{DeviceRef, VulkanResult};

/// Descriptor set layout builder for creating reusable layouts
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a combined image sampler binding
    #[must_use]
    pub fn add_combined_image_sampler(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Build the descriptor set layout
    pub fn build(self, device: DeviceRef) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);
        let layout = device.create_descriptor_set_layout(&layout_info)?;

        Ok(DescriptorSetLayout { device, layout })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    device: DeviceRef,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Layout with one fragment-stage combined image sampler at binding 0
    pub fn image_sampler(device: DeviceRef) -> VulkanResult<Self> {
        DescriptorSetLayoutBuilder::new()
            .add_combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
            .build(device)
    }

    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.device.destroy_descriptor_set_layout(self.layout);
    }
}

/// Pool of individually freeable image-sampler descriptor sets
pub struct DescriptorPool {
    device: DeviceRef,
    pool: vk::DescriptorPool,
    layout: DescriptorSetLayout,
}

impl DescriptorPool {
    /// Create a pool holding up to `max_sets` image-sampler sets
    pub fn new(device: DeviceRef, max_sets: u32) -> VulkanResult<Self> {
        let pool_sizes = [vk::DescriptorPoolSize::builder()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(max_sets)
            .build()];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let layout = DescriptorSetLayout::image_sampler(device.clone())?;
        let pool = device.create_descriptor_pool(&pool_info)?;

        Ok(Self { device, pool, layout })
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Layout of every set allocated from this pool
    pub fn layout(&self) -> &DescriptorSetLayout {
        &self.layout
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.pool);
    }
}

/// One image-sampler descriptor set, returned to its pool on drop
pub struct ImageDescriptor {
    pool: Rc<DescriptorPool>,
    set: vk::DescriptorSet,
}

impl ImageDescriptor {
    /// Allocate a set and point it at `view` sampled through `sampler`
    pub fn new(pool: &Rc<DescriptorPool>, view: vk::ImageView, sampler: vk::Sampler) -> VulkanResult<Self> {
        let set = pool
            .device
            .allocate_descriptor_set(pool.handle(), pool.layout().handle())?;

        let descriptor = Self { pool: pool.clone(), set };
        descriptor.update(view, sampler);
        Ok(descriptor)
    }

    /// Repoint the set at another view or sampler
    pub fn update(&self, view: vk::ImageView, sampler: vk::Sampler) {
        self.pool.device.update_image_descriptor(self.set, view, sampler);
    }

    /// Get the set handle
    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }
}

impl Drop for ImageDescriptor {
    fn drop(&mut self) {
        self.pool.device.free_descriptor_set(self.pool.handle(), self.set);
    }
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: DeviceRef,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Sampler with the given filter that repeats outside the texture
    pub fn new(device: DeviceRef, filter: vk::Filter) -> VulkanResult<Self> {
        Self::with_address_mode(device, filter, vk::SamplerAddressMode::REPEAT)
    }

    /// Nearest-filtered sampler returning transparent black outside the texture
    pub fn copy(device: DeviceRef) -> VulkanResult<Self> {
        Self::with_address_mode(device, vk::Filter::NEAREST, vk::SamplerAddressMode::CLAMP_TO_BORDER)
    }

    fn with_address_mode(device: DeviceRef, filter: vk::Filter, address_mode: vk::SamplerAddressMode) -> VulkanResult<Self> {
        let mipmap_mode = if filter == vk::Filter::NEAREST {
            vk::SamplerMipmapMode::NEAREST
        } else {
            vk::SamplerMipmapMode::LINEAR
        };

        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .unnormalized_coordinates(false)
            .max_lod(0.0);

        let sampler = device.create_sampler(&create_info)?;
        Ok(Self { device, sampler })
    }

    /// Get sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.device.destroy_sampler(self.sampler);
    }
}
