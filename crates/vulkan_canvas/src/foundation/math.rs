//! Math utilities and types
//!
//! 2D geometry used by the canvas renderer: integer pixel rectangles, affine
//! transforms backed by nalgebra, and packed premultiplied colours.

pub use nalgebra::{Matrix3, Vector2};

/// 2D point type
pub type Point = nalgebra::Point2<f32>;

/// Integer pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl Rect {
    /// Create a rectangle from position and size
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Create a rectangle at the origin
    pub const fn with_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Right edge (exclusive)
    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Bottom edge (exclusive)
    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// True if the rectangle covers no pixels
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Same size, moved to a new position
    pub const fn with_position(&self, x: i32, y: i32) -> Self {
        Self::new(x, y, self.width, self.height)
    }

    /// Same size, moved to the origin
    pub const fn with_zero_origin(&self) -> Self {
        self.with_position(0, 0)
    }

    /// Moved by the given offset
    pub const fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Overlapping area of two rectangles, empty if they do not intersect
    pub fn intersection(&self, other: &Self) -> Self {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= x || bottom <= y {
            Self::new(x, y, 0, 0)
        } else {
            Self::new(x, y, right - x, bottom - y)
        }
    }

    /// True if the pixel lies inside the rectangle
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }
}

/// 2D affine transform
///
/// Stored as a 3x3 matrix whose last row is always `[0, 0, 1]`. Points are
/// column vectors, so `a.followed_by(b)` applies `a` first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3<f32>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    /// The identity transform
    pub fn identity() -> Self {
        Self { matrix: Matrix3::identity() }
    }

    /// Create from the two top rows of the matrix
    #[rustfmt::skip]
    pub fn from_rows(mat00: f32, mat01: f32, mat02: f32, mat10: f32, mat11: f32, mat12: f32) -> Self {
        Self {
            matrix: Matrix3::new(
                mat00, mat01, mat02,
                mat10, mat11, mat12,
                0.0,   0.0,   1.0,
            ),
        }
    }

    /// Pure translation
    pub fn translation(dx: f32, dy: f32) -> Self {
        Self::from_rows(1.0, 0.0, dx, 0.0, 1.0, dy)
    }

    /// Pure scale around the origin
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self::from_rows(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    /// Flips the y axis inside a region of the given height
    pub fn vertical_flip(height: f32) -> Self {
        Self::from_rows(1.0, 0.0, 0.0, 0.0, -1.0, height)
    }

    /// The transform that maps three source points onto three target points
    ///
    /// Returns `None` when the source points are collinear.
    pub fn from_target_points(
        source: [Point; 3],
        target: [Point; 3],
    ) -> Option<Self> {
        let columns = |points: [Point; 3]| {
            Matrix3::new(
                points[0].x, points[1].x, points[2].x,
                points[0].y, points[1].y, points[2].y,
                1.0, 1.0, 1.0,
            )
        };

        let source_inverse = columns(source).try_inverse()?;
        Some(Self { matrix: columns(target) * source_inverse })
    }

    /// `self` then `other`
    pub fn followed_by(&self, other: &Self) -> Self {
        Self { matrix: other.matrix * self.matrix }
    }

    /// `self` then a translation
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        self.followed_by(&Self::translation(dx, dy))
    }

    /// `self` then a scale
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        self.followed_by(&Self::scale(sx, sy))
    }

    /// Inverse transform, or `self` unchanged when singular
    pub fn inverted(&self) -> Self {
        self.matrix
            .try_inverse()
            .map_or(*self, |matrix| Self { matrix })
    }

    /// Apply to a point
    pub fn transform_point(&self, point: Point) -> Point {
        self.matrix.transform_point(&point)
    }

    /// True if the transform only translates
    pub fn is_only_translation(&self) -> bool {
        let m = &self.matrix;
        m[(0, 0)] == 1.0 && m[(0, 1)] == 0.0 && m[(1, 0)] == 0.0 && m[(1, 1)] == 1.0
    }

    /// The six meaningful coefficients, row-major
    pub fn to_values(&self) -> [f32; 6] {
        let m = &self.matrix;
        [m[(0, 0)], m[(0, 1)], m[(0, 2)], m[(1, 0)], m[(1, 1)], m[(1, 2)]]
    }
}

/// Premultiplied 8-bit ARGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PixelArgb {
    /// Alpha
    pub a: u8,
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

impl PixelArgb {
    /// Fully transparent black
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    /// Create from premultiplied components
    pub const fn new(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    /// Create from straight (non-premultiplied) components
    pub fn from_straight(a: u8, r: u8, g: u8, b: u8) -> Self {
        let premultiply = |c: u8| ((u16::from(c) * (u16::from(a) + 1)) >> 8) as u8;
        Self::new(a, premultiply(r), premultiply(g), premultiply(b))
    }

    /// Grey level where every channel equals `level`, used as an image opacity multiplier
    pub const fn splat(level: u8) -> Self {
        Self::new(level, level, level, level)
    }

    /// Scale every channel by `level / 255`
    #[must_use]
    pub fn multiply_alpha(&self, level: u8) -> Self {
        let scale = u16::from(level) + 1;
        let apply = |c: u8| ((u16::from(c) * scale) >> 8) as u8;
        Self::new(apply(self.a), apply(self.r), apply(self.g), apply(self.b))
    }

    /// Packed for `A8B8G8R8_UNORM_PACK32` vertex attributes
    pub const fn to_abgr_u32(&self) -> u32 {
        (self.a as u32) << 24 | (self.b as u32) << 16 | (self.g as u32) << 8 | self.r as u32
    }

    /// Byte order of a `B8G8R8A8_UNORM` texel
    pub const fn to_bgra(&self) -> [u8; 4] {
        [self.b, self.g, self.r, self.a]
    }

    /// Linear interpolation between two colours, `t` in `0..=256`
    pub fn interpolated(&self, other: &Self, t: u32) -> Self {
        let t = t.min(256);
        let mix = |a: u8, b: u8| ((u32::from(a) * (256 - t) + u32::from(b) * t) >> 8) as u8;
        Self::new(
            mix(self.a, other.a),
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 100, 50);
        let b = Rect::new(80, 20, 40, 40);
        assert_eq!(a.intersection(&b), Rect::new(80, 20, 20, 30));
        assert!(a.intersection(&Rect::new(200, 0, 10, 10)).is_empty());
    }

    #[test]
    fn test_transform_composition_order() {
        let t = AffineTransform::translation(10.0, 0.0).scaled(2.0, 2.0);
        let p = t.transform_point(Point::new(1.0, 1.0));
        assert_relative_eq!(p.x, 22.0);
        assert_relative_eq!(p.y, 2.0);

        let back = t.inverted().transform_point(p);
        assert_relative_eq!(back.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(back.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_from_target_points() {
        let source = [Point::new(10.0, 10.0), Point::new(20.0, 10.0), Point::new(10.0, 0.0)];
        let target = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        let t = AffineTransform::from_target_points(source, target).unwrap();

        let p = t.transform_point(Point::new(15.0, 5.0));
        assert_relative_eq!(p.x, 0.5, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.5, epsilon = 1e-5);

        let collinear = [Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        assert!(AffineTransform::from_target_points(collinear, target).is_none());
    }

    #[test]
    fn test_colour_packing() {
        let c = PixelArgb::new(0xff, 0x11, 0x22, 0x33);
        assert_eq!(c.to_abgr_u32(), 0xff33_2211);
        assert_eq!(c.to_bgra(), [0x33, 0x22, 0x11, 0xff]);
        assert_eq!(c.multiply_alpha(255), c);
        assert_eq!(c.multiply_alpha(0), PixelArgb::TRANSPARENT);
    }
}
