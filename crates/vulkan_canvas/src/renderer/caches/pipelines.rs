//! Graphics pipelines built on first use

use ash::vk;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::ShaderCache;
use crate::renderer::programs::{
    ImagePushConstants, LinearGradientPushConstants, OverlayPushConstants, OverlayVertex, PushConstants, QuadVertex,
    RadialGradientPushConstants, ScreenBounds,
};
use crate::vulkan::{BlendMode, DeviceRef, GraphicsPipelineConfig, Pipeline, VulkanResult};

/// Every program the renderer draws with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Flat colour from the vertex
    SolidColour,
    /// Linear gradient evaluated along y
    LinearGradient1,
    /// Linear gradient evaluated along x
    LinearGradient2,
    /// Radial gradient
    RadialGradient,
    /// Transformed image clamped to its bounds
    Image,
    /// Transformed image repeated across the plane
    TiledImage,
    /// Full-screen blit of a layer onto a swapchain image
    Overlay,
}

impl PipelineKind {
    /// Every kind
    pub const ALL: [Self; 7] = [
        Self::SolidColour,
        Self::LinearGradient1,
        Self::LinearGradient2,
        Self::RadialGradient,
        Self::Image,
        Self::TiledImage,
        Self::Overlay,
    ];

    /// Pipeline description for this kind
    pub fn config(self) -> GraphicsPipelineConfig {
        let quads = |name, fragment| {
            GraphicsPipelineConfig::new(name, "quad", fragment).with_vertex_layout(QuadVertex::STRIDE, &QuadVertex::ATTRIBUTES)
        };
        let push = |config: GraphicsPipelineConfig, stages, size| config.with_push_constants(stages, size);

        match self {
            Self::SolidColour => push(
                quads("solid colour", "solid_colour"),
                ScreenBounds::STAGES,
                std::mem::size_of::<ScreenBounds>(),
            ),
            Self::LinearGradient1 => push(
                quads("linear gradient 1", "linear_gradient1").with_image_sampler(),
                LinearGradientPushConstants::STAGES,
                std::mem::size_of::<LinearGradientPushConstants>(),
            ),
            Self::LinearGradient2 => push(
                quads("linear gradient 2", "linear_gradient2").with_image_sampler(),
                LinearGradientPushConstants::STAGES,
                std::mem::size_of::<LinearGradientPushConstants>(),
            ),
            Self::RadialGradient => push(
                quads("radial gradient", "radial_gradient").with_image_sampler(),
                RadialGradientPushConstants::STAGES,
                std::mem::size_of::<RadialGradientPushConstants>(),
            ),
            Self::Image => push(
                quads("image", "image").with_image_sampler(),
                ImagePushConstants::STAGES,
                std::mem::size_of::<ImagePushConstants>(),
            ),
            Self::TiledImage => push(
                quads("tiled image", "tiled_image").with_image_sampler(),
                ImagePushConstants::STAGES,
                std::mem::size_of::<ImagePushConstants>(),
            ),
            Self::Overlay => GraphicsPipelineConfig::new("overlay", "overlay", "overlay_blit")
                .with_vertex_layout(OverlayVertex::STRIDE, &OverlayVertex::ATTRIBUTES)
                .with_topology(vk::PrimitiveTopology::TRIANGLE_STRIP)
                .with_blend(BlendMode::Replace)
                .with_push_constants(OverlayPushConstants::STAGES, std::mem::size_of::<OverlayPushConstants>())
                .with_image_sampler(),
        }
    }

    /// Shader names this kind needs
    pub fn shader_names(self) -> [&'static str; 2] {
        let config = self.config();
        [config.vertex_shader, config.fragment_shader]
    }
}

/// Pipelines keyed by kind and render pass
///
/// A render pass that goes away, such as the swapchain pass after a format
/// change, is dropped with [`invalidate_render_pass`](Self::invalidate_render_pass).
pub struct Pipelines {
    device: DeviceRef,
    image_sampler_layout: vk::DescriptorSetLayout,
    pipelines: RefCell<HashMap<(PipelineKind, vk::RenderPass), Rc<Pipeline>>>,
}

impl Pipelines {
    /// Empty cache
    pub fn new(device: DeviceRef, image_sampler_layout: vk::DescriptorSetLayout) -> Self {
        Self {
            device,
            image_sampler_layout,
            pipelines: RefCell::new(HashMap::new()),
        }
    }

    /// Pipeline for `kind` in `render_pass`, building it on first use
    pub fn get(&self, kind: PipelineKind, render_pass: vk::RenderPass, shaders: &ShaderCache) -> VulkanResult<Rc<Pipeline>> {
        if let Some(pipeline) = self.pipelines.borrow().get(&(kind, render_pass)) {
            return Ok(pipeline.clone());
        }

        let config = kind.config();
        let vertex_shader = shaders.get(config.vertex_shader)?;
        let fragment_shader = shaders.get(config.fragment_shader)?;

        let pipeline = Rc::new(Pipeline::new(
            self.device.clone(),
            &config,
            &vertex_shader,
            &fragment_shader,
            self.image_sampler_layout,
            render_pass,
        )?);

        self.pipelines.borrow_mut().insert((kind, render_pass), pipeline.clone());
        Ok(pipeline)
    }

    /// Forget every pipeline built for `render_pass`
    pub fn invalidate_render_pass(&self, render_pass: vk::RenderPass) {
        self.pipelines.borrow_mut().retain(|(_, pass), _| *pass != render_pass);
    }

    /// Number of built pipelines
    pub fn len(&self) -> usize {
        self.pipelines.borrow().len()
    }

    /// True when nothing has been built
    pub fn is_empty(&self) -> bool {
        self.pipelines.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockDevice};
    use crate::vulkan::SPIRV_MAGIC;
    use ash::vk::Handle;

    fn shaders(mock: &Rc<MockDevice>) -> ShaderCache {
        let cache = ShaderCache::new(mock.device(), None);
        for kind in PipelineKind::ALL {
            for name in kind.shader_names() {
                cache.insert_spirv(name, &[SPIRV_MAGIC]).unwrap();
            }
        }
        cache
    }

    #[test]
    fn test_only_overlay_is_a_strip() {
        for kind in PipelineKind::ALL {
            let config = kind.config();
            let strip = config.topology == vk::PrimitiveTopology::TRIANGLE_STRIP;
            assert_eq!(strip, kind == PipelineKind::Overlay, "{kind:?}");
            assert_eq!(config.uses_image_sampler, kind != PipelineKind::SolidColour, "{kind:?}");
        }
    }

    #[test]
    fn test_pipelines_are_built_once_per_pass() {
        let mock = MockDevice::new();
        let shaders = shaders(&mock);
        let pipelines = Pipelines::new(mock.device(), vk::DescriptorSetLayout::null());
        let (pass_a, pass_b) = (vk::RenderPass::from_raw(0xA0), vk::RenderPass::from_raw(0xB0));

        let first = pipelines.get(PipelineKind::Image, pass_a, &shaders).unwrap();
        let again = pipelines.get(PipelineKind::Image, pass_a, &shaders).unwrap();
        assert_eq!(first.handle(), again.handle());

        pipelines.get(PipelineKind::Image, pass_b, &shaders).unwrap();
        assert_eq!(mock.count(|c| matches!(c, Call::CreatePipeline(_))), 2);

        drop((first, again));
        pipelines.invalidate_render_pass(pass_a);
        assert_eq!(pipelines.len(), 1);
        assert_eq!(mock.count(|c| matches!(c, Call::DestroyPipeline(_))), 1);
    }
}
