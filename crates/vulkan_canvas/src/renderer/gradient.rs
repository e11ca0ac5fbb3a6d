//! Colour gradients and their lookup textures

use ash::vk;

use super::device_state::DeviceState;
use crate::foundation::math::{PixelArgb, Point};
use crate::vulkan::{ImageCreateInfo, ImageDescriptor, ImageTransfer, MemoryImage, VulkanResult};

/// Texels in a gradient lookup texture
pub const LOOKUP_SIZE: usize = 256;

/// A colour at a position along the gradient, `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColourStop {
    /// Position along the gradient
    pub position: f32,
    /// Premultiplied colour
    pub colour: PixelArgb,
}

/// Linear or radial colour gradient
///
/// Linear gradients run from `point1` to `point2`. Radial gradients are
/// centred on `point1` and reach their last stop at `point2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    /// Start, or centre for radial gradients
    pub point1: Point,
    /// End, or a point on the outer edge for radial gradients
    pub point2: Point,
    /// Radial rather than linear
    pub is_radial: bool,
    stops: Vec<ColourStop>,
}

impl Gradient {
    /// Two-colour linear gradient
    pub fn linear(point1: Point, colour1: PixelArgb, point2: Point, colour2: PixelArgb) -> Self {
        Self::with_stops(point1, point2, false, colour1, colour2)
    }

    /// Two-colour radial gradient
    pub fn radial(centre: Point, colour1: PixelArgb, edge: Point, colour2: PixelArgb) -> Self {
        Self::with_stops(centre, edge, true, colour1, colour2)
    }

    fn with_stops(point1: Point, point2: Point, is_radial: bool, colour1: PixelArgb, colour2: PixelArgb) -> Self {
        Self {
            point1,
            point2,
            is_radial,
            stops: vec![
                ColourStop { position: 0.0, colour: colour1 },
                ColourStop { position: 1.0, colour: colour2 },
            ],
        }
    }

    /// Insert a stop, keeping stops ordered by position
    #[must_use]
    pub fn with_stop(mut self, position: f32, colour: PixelArgb) -> Self {
        let position = position.clamp(0.0, 1.0);
        let index = self.stops.partition_point(|stop| stop.position <= position);
        self.stops.insert(index, ColourStop { position, colour });
        self
    }

    /// Stops ordered by position
    pub fn stops(&self) -> &[ColourStop] {
        &self.stops
    }

    /// Colour at every texel of the lookup texture
    pub fn lookup_table(&self) -> Vec<PixelArgb> {
        let mut table = Vec::with_capacity(LOOKUP_SIZE);
        let mut next = 0;

        for i in 0..LOOKUP_SIZE {
            let position = i as f32 / (LOOKUP_SIZE - 1) as f32;
            while next < self.stops.len() && self.stops[next].position < position {
                next += 1;
            }

            let colour = match (next.checked_sub(1).map(|i| self.stops[i]), self.stops.get(next)) {
                (Some(a), Some(b)) if b.position > a.position => {
                    let t = (position - a.position) / (b.position - a.position);
                    a.colour.interpolated(&b.colour, (t * 256.0) as u32)
                }
                (_, Some(b)) => b.colour,
                (Some(a), None) => a.colour,
                (None, None) => PixelArgb::TRANSPARENT,
            };
            table.push(colour);
        }
        table
    }
}

struct GradientTexture {
    descriptor: ImageDescriptor,
    _transfer: ImageTransfer,
    _image: MemoryImage,
}

/// Lookup textures for the gradients drawn during one frame
///
/// A new texture is made only when the gradient differs from the last one
/// drawn; otherwise the last descriptor is reused. Textures live until
/// [`reset`](Self::reset), once the frame's GPU work has completed.
#[derive(Default)]
pub struct GradientCache {
    textures: Vec<GradientTexture>,
    current: Option<Gradient>,
}

impl GradientCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the next gradient draw to build a new texture
    pub fn refresh(&mut self) {
        self.current = None;
    }

    /// Descriptor sampling the lookup texture of `gradient`
    pub fn descriptor(&mut self, gradient: &Gradient, state: &DeviceState) -> VulkanResult<vk::DescriptorSet> {
        if self.current.as_ref() == Some(gradient) {
            if let Some(texture) = self.textures.last() {
                return Ok(texture.descriptor.handle());
            }
        }

        let memory = state.memory();
        let info = ImageCreateInfo::new(LOOKUP_SIZE as u32, 1, vk::Format::B8G8R8A8_UNORM)
            .sampled()
            .transfer_dst()
            .device_local();
        let image = MemoryImage::new(memory.texture_pool(info.width, info.height), &info)?;

        let pixels: Vec<u8> = gradient.lookup_table().iter().flat_map(PixelArgb::to_bgra).collect();
        let mut transfer = ImageTransfer::new(state.device().clone(), memory.staging(), image.extent())?;
        transfer.write_pixels(&pixels)?;
        transfer.copy_buffer_to_image(&image)?;

        let descriptor = ImageDescriptor::new(state.descriptor_pool(), image.view(), state.samplers().linear())?;
        let handle = descriptor.handle();

        self.textures.push(GradientTexture {
            descriptor,
            _transfer: transfer,
            _image: image,
        });
        self.current = Some(gradient.clone());
        Ok(handle)
    }

    /// Lookup textures made since the last reset
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// True when no texture was made since the last reset
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Release every texture and require a refresh on next use
    pub fn reset(&mut self) {
        self.textures.clear();
        self.current = None;
    }
}
