//! Shader modules and graphics pipelines
//!
//! Pipelines are described by an immutable [`GraphicsPipelineConfig`] value
//! and built by [`Pipeline::new`]. Viewport and scissor are always dynamic,
//! so one pipeline serves targets of any size.

use ash::vk;
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use super::{DeviceRef, VulkanError, VulkanResult};

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: DeviceRef,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: DeviceRef, bytes: &[u8]) -> VulkanResult<Self> {
        let words = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid SPIR-V bytecode: {e}")))?;

        Self::from_words(device, &words)
    }

    /// Create shader module from SPIR-V words
    pub fn from_words(device: DeviceRef, words: &[u32]) -> VulkanResult<Self> {
        if words.first() != Some(&SPIRV_MAGIC) {
            return Err(VulkanError::InitializationFailed("Invalid SPIR-V bytecode: bad magic number".into()));
        }

        let module = device.create_shader_module(words)?;
        Ok(Self { device, module })
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: DeviceRef, path: P) -> VulkanResult<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| VulkanError::Io(format!("Failed to read shader {}: {e}", path.as_ref().display())))?;
        Self::from_bytes(device, &bytes)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.device.destroy_shader_module(self.module);
    }
}

/// How fragments combine with the attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Source-over with premultiplied alpha
    Premultiplied,
    /// Overwrite the attachment
    Replace,
}

/// Immutable description of one graphics pipeline
#[derive(Debug, Clone)]
pub struct GraphicsPipelineConfig {
    /// Name used in log output
    pub name: &'static str,
    /// Vertex shader name in the shader cache
    pub vertex_shader: &'static str,
    /// Fragment shader name in the shader cache
    pub fragment_shader: &'static str,
    /// Vertex buffer bindings
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex attributes
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Colour blending
    pub blend: BlendMode,
    /// Push constant ranges of the layout
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    /// Whether set 0 is an image-sampler set
    pub uses_image_sampler: bool,
}

impl GraphicsPipelineConfig {
    /// Pipeline drawing indexed quads from a single vertex binding
    pub fn new(name: &'static str, vertex_shader: &'static str, fragment_shader: &'static str) -> Self {
        Self {
            name,
            vertex_shader,
            fragment_shader,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            blend: BlendMode::Premultiplied,
            push_constant_ranges: Vec::new(),
            uses_image_sampler: false,
        }
    }

    /// Vertex layout of binding 0
    #[must_use]
    pub fn with_vertex_layout(mut self, stride: u32, attributes: &[(vk::Format, u32)]) -> Self {
        self.vertex_bindings = vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        self.vertex_attributes = attributes
            .iter()
            .enumerate()
            .map(|(location, &(format, offset))| vk::VertexInputAttributeDescription {
                location: location as u32,
                binding: 0,
                format,
                offset,
            })
            .collect();
        self
    }

    /// Primitive topology
    #[must_use]
    pub fn with_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Blend mode
    #[must_use]
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Add a push constant range at offset 0
    #[must_use]
    pub fn with_push_constants(mut self, stages: vk::ShaderStageFlags, size: usize) -> Self {
        self.push_constant_ranges.push(vk::PushConstantRange {
            stage_flags: stages,
            offset: 0,
            size: size as u32,
        });
        self
    }

    /// Bind an image sampler at set 0
    #[must_use]
    pub fn with_image_sampler(mut self) -> Self {
        self.uses_image_sampler = true;
        self
    }
}

/// Pipeline layout wrapper with RAII cleanup
pub struct PipelineLayout {
    device: DeviceRef,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create a layout from set layouts and push constant ranges
    pub fn new(
        device: DeviceRef,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = device.create_pipeline_layout(&layout_info)?;
        Ok(Self { device, layout })
    }

    /// Get layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        self.device.destroy_pipeline_layout(self.layout);
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct Pipeline {
    device: DeviceRef,
    pipeline: vk::Pipeline,
    layout: PipelineLayout,
}

impl Pipeline {
    /// Build the pipeline a config describes
    pub fn new(
        device: DeviceRef,
        config: &GraphicsPipelineConfig,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        image_sampler_layout: vk::DescriptorSetLayout,
        render_pass: vk::RenderPass,
    ) -> VulkanResult<Self> {
        let set_layouts: &[vk::DescriptorSetLayout] = if config.uses_image_sampler {
            std::slice::from_ref(&image_sampler_layout)
        } else {
            &[]
        };
        let layout = PipelineLayout::new(device.clone(), set_layouts, &config.push_constant_ranges)?;

        // SAFETY: the literal is nul terminated with no interior nul.
        let entry = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader.handle())
                .name(entry)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader.handle())
                .name(entry)
                .build(),
        ];

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(config.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = match config.blend {
            BlendMode::Premultiplied => vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::ONE)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build(),
            BlendMode::Replace => vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
                .build(),
        };

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass)
            .subpass(0);

        let pipeline = device.create_graphics_pipeline(&pipeline_info)?;
        log::debug!("Created pipeline '{}'", config.name);

        Ok(Self { device, pipeline, layout })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.pipeline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_locations_follow_order() {
        let config = GraphicsPipelineConfig::new("test", "a.vert", "a.frag")
            .with_vertex_layout(8, &[(vk::Format::R16G16_SSCALED, 0), (vk::Format::A8B8G8R8_UNORM_PACK32, 4)])
            .with_push_constants(vk::ShaderStageFlags::VERTEX, 16);

        assert_eq!(config.vertex_bindings[0].stride, 8);
        assert_eq!(config.vertex_attributes[1].location, 1);
        assert_eq!(config.vertex_attributes[1].offset, 4);
        assert_eq!(config.push_constant_ranges[0].size, 16);
        assert!(!config.uses_image_sampler);
    }

    #[test]
    fn test_invalid_spirv_is_rejected() {
        let mock = crate::testing::MockDevice::new();
        assert!(ShaderModule::from_bytes(mock.device(), &[1, 2, 3]).is_err());
        assert!(ShaderModule::from_words(mock.device(), &[0xDEAD_BEEF]).is_err());
        assert!(ShaderModule::from_words(mock.device(), &[SPIRV_MAGIC, 0x0001_0000]).is_ok());
    }
}
