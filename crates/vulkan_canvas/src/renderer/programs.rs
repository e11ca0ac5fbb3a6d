//! Vertex formats and push-constant blocks shared with the shaders
//!
//! Every block starts with the layer's screen bounds so the common quad
//! vertex shader can read them regardless of the fragment program.

use ash::vk;

use crate::foundation::math::{AffineTransform, PixelArgb, Rect};

/// A push-constant block and the stages that read it
pub trait PushConstants: bytemuck::Pod {
    /// Shader stages the block is visible to
    const STAGES: vk::ShaderStageFlags;
}

/// Quad corner: pixel position and premultiplied colour
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuadVertex {
    /// Pixel x
    pub x: i16,
    /// Pixel y
    pub y: i16,
    /// Colour packed as `A8B8G8R8`
    pub colour: u32,
}

unsafe impl bytemuck::Pod for QuadVertex {}
unsafe impl bytemuck::Zeroable for QuadVertex {}

impl QuadVertex {
    /// Byte stride of one vertex
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;
    /// Position then colour
    pub const ATTRIBUTES: [(vk::Format, u32); 2] = [
        (vk::Format::R16G16_SSCALED, 0),
        (vk::Format::A8B8G8R8_UNORM_PACK32, 4),
    ];

    /// Create a vertex, saturating coordinates to the `i16` range
    pub fn new(x: i32, y: i32, colour: PixelArgb) -> Self {
        let clamp = |v: i32| v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        Self { x: clamp(x), y: clamp(y), colour: colour.to_abgr_u32() }
    }
}

/// Corner of the full-screen overlay strip
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayVertex {
    /// Pixel x
    pub x: i16,
    /// Pixel y
    pub y: i16,
}

unsafe impl bytemuck::Pod for OverlayVertex {}
unsafe impl bytemuck::Zeroable for OverlayVertex {}

impl OverlayVertex {
    /// Byte stride of one vertex
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;
    /// Position only
    pub const ATTRIBUTES: [(vk::Format, u32); 1] = [(vk::Format::R16G16_SSCALED, 0)];

    /// Triangle-strip corners of a rectangle: bottom-left, bottom-right, top-left, top-right
    pub fn strip(area: Rect) -> [Self; 4] {
        let clamp = |v: i32| v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        let (l, t, r, b) = (clamp(area.x), clamp(area.y), clamp(area.right()), clamp(area.bottom()));
        [
            Self { x: l, y: b },
            Self { x: r, y: b },
            Self { x: l, y: t },
            Self { x: r, y: t },
        ]
    }
}

/// Layer origin and half size, mapping pixels to clip space
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenBounds {
    /// Layer origin x
    pub x: f32,
    /// Layer origin y
    pub y: f32,
    /// Half the layer width
    pub half_width: f32,
    /// Half the layer height
    pub half_height: f32,
}

unsafe impl bytemuck::Pod for ScreenBounds {}
unsafe impl bytemuck::Zeroable for ScreenBounds {}

impl PushConstants for ScreenBounds {
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;
}

impl ScreenBounds {
    /// Bounds of a layer
    pub fn from_rect(bounds: Rect) -> Self {
        Self {
            x: bounds.x as f32,
            y: bounds.y as f32,
            half_width: bounds.width as f32 * 0.5,
            half_height: bounds.height as f32 * 0.5,
        }
    }

    fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.half_width, self.half_height]
    }
}

/// Image draw: pixel-to-texture matrix and the texture coordinate limits
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImagePushConstants {
    /// See [`ScreenBounds`]
    pub screen_bounds: [f32; 4],
    /// Largest texture coordinate that stays inside the image
    pub image_limits: [f32; 2],
    /// Pixel to texture coordinate transform, row-major top two rows
    pub matrix: [f32; 6],
}

unsafe impl bytemuck::Pod for ImagePushConstants {}
unsafe impl bytemuck::Zeroable for ImagePushConstants {}

impl PushConstants for ImagePushConstants {
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::ALL_GRAPHICS;
}

impl ImagePushConstants {
    /// Block for a draw inside `bounds`
    pub fn new(bounds: ScreenBounds, image_limits: [f32; 2], matrix: &AffineTransform) -> Self {
        Self {
            screen_bounds: bounds.to_array(),
            image_limits,
            matrix: matrix.to_values(),
        }
    }
}

/// Linear gradient projected onto one axis
///
/// The shader computes `(axis - gradient * cross_axis - start) / length`,
/// where the axes are x/y for the first program and y/x for the second.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinearGradientPushConstants {
    /// See [`ScreenBounds`]
    pub screen_bounds: [f32; 4],
    /// Start point of the gradient line
    pub start: [f32; 2],
    /// Slope of the iso-colour lines
    pub gradient: f32,
    /// Distance covered by the colour ramp
    pub length: f32,
}

unsafe impl bytemuck::Pod for LinearGradientPushConstants {}
unsafe impl bytemuck::Zeroable for LinearGradientPushConstants {}

impl PushConstants for LinearGradientPushConstants {
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::ALL_GRAPHICS;
}

impl LinearGradientPushConstants {
    /// Block for a draw inside `bounds`
    pub fn new(bounds: ScreenBounds, start: [f32; 2], gradient: f32, length: f32) -> Self {
        Self {
            screen_bounds: bounds.to_array(),
            start,
            gradient,
            length,
        }
    }
}

/// Radial gradient: pixel to unit-circle transform
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RadialGradientPushConstants {
    /// See [`ScreenBounds`]
    pub screen_bounds: [f32; 4],
    /// Pixel to gradient space transform, row-major top two rows
    pub matrix: [f32; 6],
    /// Keeps the block a multiple of 16 bytes
    pub padding: [f32; 2],
}

unsafe impl bytemuck::Pod for RadialGradientPushConstants {}
unsafe impl bytemuck::Zeroable for RadialGradientPushConstants {}

impl PushConstants for RadialGradientPushConstants {
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::ALL_GRAPHICS;
}

impl RadialGradientPushConstants {
    /// Block for a draw inside `bounds`
    pub fn new(bounds: ScreenBounds, matrix: &AffineTransform) -> Self {
        Self {
            screen_bounds: bounds.to_array(),
            matrix: matrix.to_values(),
            padding: [0.0; 2],
        }
    }
}

/// Overlay blit of a frame attachment into a swapchain image
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OverlayPushConstants {
    /// Swapchain image size in pixels
    pub screen_size: [f32; 2],
    /// Texture coordinate rectangle: x, y, width, height
    pub texture_bounds: [f32; 4],
    /// Vertical texture offset and scale, `(0, 1)` unless flipped
    pub v_offset_and_scale: [f32; 2],
}

unsafe impl bytemuck::Pod for OverlayPushConstants {}
unsafe impl bytemuck::Zeroable for OverlayPushConstants {}

impl PushConstants for OverlayPushConstants {
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sizes_match_shader_layouts() {
        assert_eq!(std::mem::size_of::<QuadVertex>(), 8);
        assert_eq!(std::mem::size_of::<OverlayVertex>(), 4);
        assert_eq!(std::mem::size_of::<ScreenBounds>(), 16);
        assert_eq!(std::mem::size_of::<ImagePushConstants>(), 48);
        assert_eq!(std::mem::size_of::<LinearGradientPushConstants>(), 32);
        assert_eq!(std::mem::size_of::<RadialGradientPushConstants>(), 48);
        assert_eq!(std::mem::size_of::<OverlayPushConstants>(), 32);
    }

    #[test]
    fn test_overlay_strip_order() {
        let strip = OverlayVertex::strip(Rect::new(0, 0, 640, 480));
        assert_eq!(strip[0], OverlayVertex { x: 0, y: 480 });
        assert_eq!(strip[3], OverlayVertex { x: 640, y: 0 });
    }

    #[test]
    fn test_vertex_saturates() {
        let v = QuadVertex::new(40_000, -40_000, PixelArgb::TRANSPARENT);
        assert_eq!((v.x, v.y), (i16::MAX, i16::MIN));
    }
}
