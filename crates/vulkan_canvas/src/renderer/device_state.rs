//! Everything one device shares across frames

use ash::vk;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::caches::{
    CachedMemory, ImageId, PipelineKind, Pipelines, PixelImage, Samplers, ShaderCache, Texture, TextureCache,
};
use crate::config::RendererConfig;
use crate::foundation::time::{Clock, MonotonicClock, Throttle};
use crate::vulkan::{DescriptorPool, DeviceRef, Pipeline, RenderPass, VulkanError, VulkanResult};

/// Format of every layer attachment
pub const LAYER_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// Per-device caches: memory pools, shaders, pipelines, samplers and textures
///
/// Shared as `Rc<DeviceState>` by the render context and every frame. Nothing
/// here is tied to a particular frame; frames keep what they borrow alive
/// through their own caches.
pub struct DeviceState {
    textures: RefCell<TextureCache>,
    pipelines: Pipelines,
    shaders: ShaderCache,
    samplers: Samplers,
    descriptor_pool: Rc<DescriptorPool>,
    offscreen_pass: RenderPass,
    swapchain_pass: RefCell<Option<(vk::Format, RenderPass)>>,
    memory: CachedMemory,
    minimize_throttle: Cell<Throttle>,
    clock: Rc<dyn Clock>,
    config: RendererConfig,
    device: DeviceRef,
}

impl DeviceState {
    /// Create the state for `device` with a monotonic clock
    pub fn new(device: DeviceRef, config: RendererConfig) -> VulkanResult<Rc<Self>> {
        Self::with_clock(device, config, Rc::new(MonotonicClock::new()))
    }

    /// Create the state reading time from `clock`
    pub fn with_clock(device: DeviceRef, config: RendererConfig, clock: Rc<dyn Clock>) -> VulkanResult<Rc<Self>> {
        config
            .validate()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let memory = CachedMemory::new(device.clone(), &config.memory)?;
        let descriptor_pool = Rc::new(DescriptorPool::new(device.clone(), config.textures.descriptor_pool_size)?);
        let samplers = Samplers::new(&device)?;
        let offscreen_pass = RenderPass::offscreen(device.clone(), LAYER_FORMAT)?;
        let shaders = ShaderCache::new(device.clone(), config.shader_directory.clone());
        let pipelines = Pipelines::new(device.clone(), descriptor_pool.layout().handle());
        let textures = TextureCache::new(device.clone(), clock.clone(), config.textures.eviction_age());

        log::info!(
            "Device state ready: {} frames in flight, shaders from {}",
            config.max_frames_in_flight,
            config
                .shader_directory
                .as_ref()
                .map_or_else(|| "<embedded>".to_owned(), |dir| dir.display().to_string())
        );

        Ok(Rc::new(Self {
            textures: RefCell::new(textures),
            pipelines,
            shaders,
            samplers,
            descriptor_pool,
            offscreen_pass,
            swapchain_pass: RefCell::new(None),
            memory,
            minimize_throttle: Cell::new(Throttle::new(config.memory.minimize_interval())),
            clock,
            config,
            device,
        }))
    }

    /// The device
    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    /// Configuration the state was created with
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Time source for cache ageing
    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    /// Memory pools
    pub fn memory(&self) -> &CachedMemory {
        &self.memory
    }

    /// Shader modules
    pub fn shaders(&self) -> &ShaderCache {
        &self.shaders
    }

    /// Samplers
    pub fn samplers(&self) -> &Samplers {
        &self.samplers
    }

    /// Pool every image-sampler descriptor comes from
    pub fn descriptor_pool(&self) -> &Rc<DescriptorPool> {
        &self.descriptor_pool
    }

    /// Render pass of layer attachments
    pub fn offscreen_pass(&self) -> vk::RenderPass {
        self.offscreen_pass.handle()
    }

    /// Render pass targeting swapchain images of `format`
    ///
    /// A format change replaces the pass and forgets its pipelines, so only
    /// call this while no frame using the old pass is in flight.
    pub fn swapchain_pass(&self, format: vk::Format) -> VulkanResult<vk::RenderPass> {
        let mut slot = self.swapchain_pass.borrow_mut();
        if let Some((current, pass)) = slot.as_ref() {
            if *current == format {
                return Ok(pass.handle());
            }
            log::debug!("Swapchain format changed from {current:?} to {format:?}");
            self.pipelines.invalidate_render_pass(pass.handle());
        }

        let pass = RenderPass::swapchain(self.device.clone(), format)?;
        let handle = pass.handle();
        *slot = Some((format, pass));
        Ok(handle)
    }

    /// Pipeline for `kind` in `render_pass`
    pub fn pipeline(&self, kind: PipelineKind, render_pass: vk::RenderPass) -> VulkanResult<Rc<Pipeline>> {
        self.pipelines.get(kind, render_pass, &self.shaders)
    }

    /// Pipeline for `kind` drawing into layer attachments
    pub fn layer_pipeline(&self, kind: PipelineKind) -> VulkanResult<Rc<Pipeline>> {
        self.pipeline(kind, self.offscreen_pass())
    }

    /// Uploaded texture for `image`
    pub fn texture(&self, image: &PixelImage) -> VulkanResult<Rc<Texture>> {
        self.textures
            .borrow_mut()
            .get(image, &self.memory, &self.descriptor_pool, &self.samplers)
    }

    /// Forget the texture of an image whose pixels changed
    pub fn image_changed(&self, id: ImageId) -> bool {
        self.textures.borrow_mut().image_changed(id)
    }

    /// Forget the texture of a deleted image
    pub fn image_deleted(&self, id: ImageId) -> bool {
        self.textures.borrow_mut().image_deleted(id)
    }

    /// Number of cached textures
    pub fn texture_count(&self) -> usize {
        self.textures.borrow().len()
    }

    /// Release idle textures
    pub fn sweep_textures(&self) -> usize {
        self.textures.borrow_mut().sweep()
    }

    /// Release idle textures and empty memory blocks
    ///
    /// Runs at most once per configured interval unless `force` is set.
    /// Returns whether it ran.
    pub fn minimize_storage(&self, force: bool) -> bool {
        let mut throttle = self.minimize_throttle.get();
        let ready = throttle.ready(self.clock.now(), force);
        self.minimize_throttle.set(throttle);

        if !ready {
            return false;
        }

        let textures = self.sweep_textures();
        let blocks = self.memory.minimize_storage();
        log::debug!("Minimized storage: {textures} textures, {blocks} memory blocks released");
        true
    }
}

impl Drop for DeviceState {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Device wait failed while releasing device state: {err}");
        }
        self.textures.get_mut().clear();
    }
}
