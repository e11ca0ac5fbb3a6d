//! Drawing operations on a render frame, and nested transparency layers

use ash::vk;
use std::cell::RefCell;
use std::rc::Rc;

use super::caches::{PipelineKind, PixelImage, ResamplingQuality, Texture};
use super::device_state::DeviceState;
use super::gradient::{Gradient, GradientCache};
use super::programs::{ImagePushConstants, LinearGradientPushConstants, RadialGradientPushConstants, ScreenBounds};
use super::render_frame::RenderFrame;
use super::spans::{RectangleList, SpanSource};
use crate::foundation::math::{AffineTransform, PixelArgb, Point, Rect};
use crate::vulkan::{ImageDescriptor, VulkanError, VulkanResult};

/// Resources a frame's GPU work reads until it completes
///
/// Shared by a layer and every layer nested in it. [`reset`](Self::reset)
/// releases everything and must only run once the frame's fence has signaled.
#[derive(Default)]
pub struct RenderCache {
    gradients: GradientCache,
    textures: Vec<Rc<Texture>>,
    descriptors: Vec<ImageDescriptor>,
    layers: Vec<RenderFrame>,
    pending_wait: Option<vk::Semaphore>,
}

impl RenderCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Nested layers submitted since the last reset
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Textures borrowed since the last reset
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Gradient lookup textures made since the last reset
    pub fn gradient_count(&self) -> usize {
        self.gradients.len()
    }

    /// Semaphore signaled by earlier work of the frame that nothing waits on yet
    ///
    /// Every submission of the frame waits on it and then leaves its own
    /// signal in its place, so the frame's layers form one chain.
    pub fn pending_wait(&self) -> Option<vk::Semaphore> {
        self.pending_wait
    }

    /// Release everything held for the frame
    pub fn reset(&mut self) {
        self.descriptors.clear();
        self.textures.clear();
        self.gradients.reset();
        self.layers.clear();
        self.pending_wait = None;
    }
}

/// Shared handle to a frame's [`RenderCache`]
pub type CacheRef = Rc<RefCell<RenderCache>>;

fn nearest_point_on_line(a: Point, b: Point, p: Point) -> Point {
    let direction = b - a;
    let length_squared = direction.norm_squared();
    if length_squared == 0.0 {
        return a;
    }
    a + direction * ((p - a).dot(&direction) / length_squared)
}

/// A render frame plus the drawing operations of the canvas
///
/// Coordinates are canvas pixels; the layer's bounds select which part of
/// the canvas its attachment covers. Every operation draws its spans and
/// flushes before returning.
pub struct RenderLayer {
    frame: RenderFrame,
    cache: CacheRef,
    quality: ResamplingQuality,
}

impl RenderLayer {
    /// Create a layer over `bounds` sharing `cache`
    pub fn new(state: Rc<DeviceState>, bounds: Rect, cache: CacheRef) -> VulkanResult<Self> {
        Ok(Self {
            frame: RenderFrame::new(state, bounds)?,
            cache,
            quality: ResamplingQuality::default(),
        })
    }

    /// Canvas area the layer covers
    pub fn bounds(&self) -> Rect {
        self.frame.bounds()
    }

    /// Underlying frame
    pub fn frame(&self) -> &RenderFrame {
        &self.frame
    }

    /// Underlying frame, for semaphore wiring and raw recording
    pub fn frame_mut(&mut self) -> &mut RenderFrame {
        &mut self.frame
    }

    /// The cache shared with nested layers
    pub fn cache(&self) -> &CacheRef {
        &self.cache
    }

    /// Start recording
    pub fn begin_render(&mut self, clear: bool) -> VulkanResult<()> {
        self.frame.begin_render(clear)
    }

    /// Finish recording
    pub fn end_render(&mut self) -> VulkanResult<()> {
        self.frame.end_render()
    }

    /// Start the frame's wait chain at `semaphore`
    pub fn set_wait_semaphore(&mut self, semaphore: Option<vk::Semaphore>) {
        self.cache.borrow_mut().pending_wait = semaphore;
    }

    /// Submit after everything submitted earlier in the frame
    ///
    /// Waits on the cache's pending semaphore and leaves the frame's signal
    /// semaphore pending instead. A failed submission leaves the chain as it was.
    pub fn submit(&mut self, fence: Option<vk::Fence>) -> VulkanResult<()> {
        let wait = self.cache.borrow_mut().pending_wait.take();
        self.frame.set_wait_semaphore(wait);

        let result = self.frame.submit(fence);
        self.cache.borrow_mut().pending_wait = match &result {
            Ok(()) => self.frame.signal_semaphore(),
            Err(_) => wait,
        };
        result
    }

    /// Filtering used by image draws
    pub fn set_sampler_quality(&mut self, quality: ResamplingQuality) {
        self.quality = quality;
    }

    /// Current image filtering
    pub fn sampler_quality(&self) -> ResamplingQuality {
        self.quality
    }

    /// Make the next gradient fill build a fresh lookup texture
    pub fn refresh_gradient(&self) {
        self.cache.borrow_mut().gradients.refresh();
    }

    /// Set an area to `colour`, ignoring blending
    pub fn clear(&mut self, area: Rect, colour: PixelArgb) -> VulkanResult<()> {
        self.frame.clear_area(area, colour)
    }

    /// Fill spans with a premultiplied colour
    pub fn fill_solid<S: SpanSource + ?Sized>(&mut self, spans: &S, colour: PixelArgb) -> VulkanResult<()> {
        let pipeline = self.frame.state().layer_pipeline(PipelineKind::SolidColour)?;
        self.frame.bind_pipeline(&pipeline)?;
        self.frame
            .push_constants(pipeline.layout(), &ScreenBounds::from_rect(self.bounds()))?;
        self.frame.add_spans(spans, colour)?;
        self.frame.flush()
    }

    /// Fill spans with a gradient placed by `transform`, scaled by `alpha`
    ///
    /// Degenerate gradients whose points coincide draw nothing.
    pub fn fill_gradient<S: SpanSource + ?Sized>(
        &mut self,
        spans: &S,
        gradient: &Gradient,
        transform: &AffineTransform,
        alpha: u8,
    ) -> VulkanResult<()> {
        let state = self.frame.state().clone();
        let bounds = self.bounds();
        let t = transform.translated(-bounds.x as f32, -bounds.y as f32);

        let (g1, g2) = (gradient.point1, gradient.point2);
        let p1 = t.transform_point(g1);
        let p2 = t.transform_point(g2);
        let p3 = t.transform_point(Point::new(g1.x + (g2.y - g1.y), g1.y - (g2.x - g1.x)));

        let screen = ScreenBounds::from_rect(bounds);

        if gradient.is_radial {
            let Some(matrix) = AffineTransform::from_target_points(
                [p1, p2, p3],
                [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)],
            ) else {
                log::trace!("Skipping degenerate radial gradient");
                return Ok(());
            };

            let pipeline = state.layer_pipeline(PipelineKind::RadialGradient)?;
            let set = self.cache.borrow_mut().gradients.descriptor(gradient, &state)?;
            self.frame.bind_pipeline(&pipeline)?;
            self.frame.bind_descriptor(pipeline.layout(), set)?;
            self.frame
                .push_constants(pipeline.layout(), &RadialGradientPushConstants::new(screen, &matrix))?;
        } else {
            let p1 = nearest_point_on_line(p1, p3, p2);
            let (dx, dy) = (p2.x - p1.x, p1.y - p2.y);

            let (kind, grad, length) = if dx.abs() < dy.abs() {
                let grad = dx / dy;
                (PipelineKind::LinearGradient1, grad, (p2.y - grad * p2.x) - (p1.y - grad * p1.x))
            } else {
                let grad = dy / dx;
                (PipelineKind::LinearGradient2, grad, (p2.x - grad * p2.y) - (p1.x - grad * p1.y))
            };

            if !grad.is_finite() || length == 0.0 || !length.is_finite() {
                log::trace!("Skipping degenerate linear gradient");
                return Ok(());
            }

            let pipeline = state.layer_pipeline(kind)?;
            let set = self.cache.borrow_mut().gradients.descriptor(gradient, &state)?;
            self.frame.bind_pipeline(&pipeline)?;
            self.frame.bind_descriptor(pipeline.layout(), set)?;
            self.frame.push_constants(
                pipeline.layout(),
                &LinearGradientPushConstants::new(screen, [p1.x, p1.y], grad, length),
            )?;
        }

        self.frame.add_spans(spans, PixelArgb::splat(alpha))?;
        self.frame.flush()
    }

    /// Fill spans with `image` placed by `transform`, scaled by `alpha`
    ///
    /// With `tiled`, the image repeats across the plane; otherwise pixels
    /// outside it stay transparent.
    pub fn render_image<S: SpanSource + ?Sized>(
        &mut self,
        spans: &S,
        image: &PixelImage,
        transform: &AffineTransform,
        alpha: u8,
        tiled: bool,
    ) -> VulkanResult<()> {
        let state = self.frame.state().clone();
        let texture = state.texture(image)?;
        let set = texture.descriptor(self.quality);
        let extent = texture.extent();
        self.cache.borrow_mut().textures.push(texture);

        let (w, h) = (extent.width as f32, extent.height as f32);
        let limits = if tiled { [1.0 - 0.5 / w, 1.0 - 0.5 / h] } else { [1.0, 1.0] };
        let kind = if tiled { PipelineKind::TiledImage } else { PipelineKind::Image };

        self.draw_image(kind, set, transform, extent, limits, false)?;
        self.frame.add_spans(spans, PixelArgb::splat(alpha))?;
        self.frame.flush()
    }

    /// Draw a sampled view stretched over `area`
    pub fn render_framebuffer(&mut self, view: vk::ImageView, extent: vk::Extent2D, area: Rect, flip: bool) -> VulkanResult<()> {
        self.draw_view(view, extent, area, PixelArgb::splat(255), flip)
    }

    /// Create a nested layer over `area`, already recording
    ///
    /// The nested layer joins the frame's wait chain only when it is handed
    /// back through [`render_layer`](Self::render_layer); a nested layer that
    /// is dropped instead leaves no trace in the chain.
    pub fn create_render_layer(&mut self, area: Rect) -> VulkanResult<Self> {
        if area.width <= 0 || area.height <= 0 {
            return Err(VulkanError::invalid(format!("Layer area must not be empty, got {area:?}")));
        }

        let mut child = Self::new(self.frame.state().clone(), area, self.cache.clone())?;
        child.quality = self.quality;
        child.begin_render(true)?;
        Ok(child)
    }

    /// Finish and submit a nested layer, then composite it at its bounds
    pub fn render_layer(&mut self, child: Self, alpha: u8) -> VulkanResult<()> {
        let area = child.bounds();
        let placement = AffineTransform::translation(area.x as f32, area.y as f32);
        self.render_layer_transformed(child, &RectangleList::from(area), alpha, &placement)
    }

    /// Finish and submit a nested layer, then composite it through `spans`
    ///
    /// `transform` maps the nested layer's pixels, with its top left corner
    /// at the origin, onto this layer's canvas coordinates.
    pub fn render_layer_transformed<S: SpanSource + ?Sized>(
        &mut self,
        mut child: Self,
        spans: &S,
        alpha: u8,
        transform: &AffineTransform,
    ) -> VulkanResult<()> {
        child.end_render()?;
        child.submit(None)?;

        let Self { frame, .. } = child;
        let attachment = frame.attachment();
        let (view, extent) = (attachment.view(), attachment.extent());
        self.cache.borrow_mut().layers.push(frame);

        let set = self.view_descriptor(view)?;
        self.draw_image(PipelineKind::Image, set, transform, extent, [1.0, 1.0], false)?;
        self.frame.add_spans(spans, PixelArgb::splat(alpha))?;
        self.frame.flush()
    }

    fn view_descriptor(&mut self, view: vk::ImageView) -> VulkanResult<vk::DescriptorSet> {
        let state = self.frame.state().clone();
        let descriptor = ImageDescriptor::new(state.descriptor_pool(), view, state.samplers().linear())?;
        let set = descriptor.handle();
        self.cache.borrow_mut().descriptors.push(descriptor);
        Ok(set)
    }

    fn draw_view(&mut self, view: vk::ImageView, extent: vk::Extent2D, area: Rect, colour: PixelArgb, flip: bool) -> VulkanResult<()> {
        let set = self.view_descriptor(view)?;
        let transform = AffineTransform::scale(
            area.width as f32 / extent.width as f32,
            area.height as f32 / extent.height as f32,
        )
        .translated(area.x as f32, area.y as f32);

        self.draw_image(PipelineKind::Image, set, &transform, extent, [1.0, 1.0], flip)?;
        self.frame.add_quad(area, colour)?;
        self.frame.flush()
    }

    fn draw_image(
        &mut self,
        kind: PipelineKind,
        set: vk::DescriptorSet,
        transform: &AffineTransform,
        extent: vk::Extent2D,
        limits: [f32; 2],
        flip: bool,
    ) -> VulkanResult<()> {
        let pipeline = self.frame.state().layer_pipeline(kind)?;
        self.frame.bind_pipeline(&pipeline)?;
        self.frame.bind_descriptor(pipeline.layout(), set)?;

        let bounds = self.bounds();
        let mut matrix = transform
            .translated(-bounds.x as f32, -bounds.y as f32)
            .inverted()
            .scaled(1.0 / extent.width as f32, 1.0 / extent.height as f32);
        if flip {
            matrix = matrix.followed_by(&AffineTransform::vertical_flip(1.0));
        }

        self.frame.push_constants(
            pipeline.layout(),
            &ImagePushConstants::new(ScreenBounds::from_rect(bounds), limits, &matrix),
        )
    }
}
