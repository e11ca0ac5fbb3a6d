//! Coverage sources consumed by the quad batcher
//!
//! A [`SpanSource`] reports the area to fill as rectangles with a coverage
//! level each. Whole rectangles come through as one quad; anti-aliased edges
//! come through as one-pixel-high runs.

use crate::foundation::math::Rect;

/// Something that can enumerate covered pixel areas
pub trait SpanSource {
    /// Visit every covered rectangle with its coverage, `255` meaning opaque
    fn for_each_span(&self, visit: &mut dyn FnMut(Rect, u8));

    /// Smallest rectangle containing every span
    fn bounds(&self) -> Rect {
        let mut bounds: Option<(i32, i32, i32, i32)> = None;
        self.for_each_span(&mut |area, _| {
            let (l, t, r, b) = bounds.unwrap_or((area.x, area.y, area.right(), area.bottom()));
            bounds = Some((l.min(area.x), t.min(area.y), r.max(area.right()), b.max(area.bottom())));
        });
        bounds.map_or_else(Rect::default, |(l, t, r, b)| Rect::new(l, t, r - l, b - t))
    }
}

/// Opaque rectangles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RectangleList {
    rects: Vec<Rect>,
}

impl RectangleList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rectangle; empty ones are ignored
    pub fn add(&mut self, rect: Rect) {
        if !rect.is_empty() {
            self.rects.push(rect);
        }
    }

    /// Rectangles in insertion order
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// True when nothing is covered
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}

impl From<Rect> for RectangleList {
    fn from(rect: Rect) -> Self {
        let mut list = Self::new();
        list.add(rect);
        list
    }
}

impl FromIterator<Rect> for RectangleList {
    fn from_iter<I: IntoIterator<Item = Rect>>(iter: I) -> Self {
        let mut list = Self::new();
        iter.into_iter().for_each(|rect| list.add(rect));
        list
    }
}

impl SpanSource for RectangleList {
    fn for_each_span(&self, visit: &mut dyn FnMut(Rect, u8)) {
        for rect in &self.rects {
            visit(*rect, 255);
        }
    }
}

/// Scanline coverage built pixel by pixel, run by run, or rectangle by rectangle
///
/// Consecutive pixels on one row with equal coverage are merged into a
/// single run as they are added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanList {
    spans: Vec<(Rect, u8)>,
}

impl SpanList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// One pixel
    pub fn add_pixel(&mut self, x: i32, y: i32, alpha: u8) {
        self.add_run(x, y, 1, alpha);
    }

    /// A horizontal run of `width` pixels
    pub fn add_run(&mut self, x: i32, y: i32, width: i32, alpha: u8) {
        if width <= 0 || alpha == 0 {
            return;
        }

        if let Some((last, last_alpha)) = self.spans.last_mut() {
            if *last_alpha == alpha && last.height == 1 && last.y == y && last.right() == x {
                last.width += width;
                return;
            }
        }

        self.spans.push((Rect::new(x, y, width, 1), alpha));
    }

    /// A rectangle with uniform coverage
    pub fn add_rectangle(&mut self, rect: Rect, alpha: u8) {
        if !rect.is_empty() && alpha > 0 {
            self.spans.push((rect, alpha));
        }
    }

    /// Number of stored spans after merging
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True when nothing is covered
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

impl SpanSource for SpanList {
    fn for_each_span(&self, visit: &mut dyn FnMut(Rect, u8)) {
        for (rect, alpha) in &self.spans {
            visit(*rect, *alpha);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_merge_on_same_row() {
        let mut spans = SpanList::new();
        spans.add_pixel(0, 0, 128);
        spans.add_pixel(1, 0, 128);
        spans.add_run(2, 0, 3, 128);
        spans.add_pixel(5, 0, 64);
        spans.add_pixel(6, 1, 64);

        assert_eq!(spans.len(), 3);
        let mut seen = Vec::new();
        spans.for_each_span(&mut |rect, alpha| seen.push((rect, alpha)));
        assert_eq!(seen[0], (Rect::new(0, 0, 5, 1), 128));
    }

    #[test]
    fn test_empty_areas_are_dropped() {
        let mut spans = SpanList::new();
        spans.add_run(0, 0, 0, 255);
        spans.add_pixel(0, 0, 0);
        spans.add_rectangle(Rect::new(0, 0, 4, 0), 255);
        assert!(spans.is_empty());

        let list: RectangleList = [Rect::new(0, 0, 0, 3), Rect::new(1, 1, 2, 2)].into_iter().collect();
        assert_eq!(list.rects().len(), 1);
    }

    #[test]
    fn test_bounds_cover_all_spans() {
        let list: RectangleList = [Rect::new(10, 10, 5, 5), Rect::new(0, 20, 2, 2)].into_iter().collect();
        assert_eq!(list.bounds(), Rect::new(0, 10, 15, 12));
        assert_eq!(RectangleList::new().bounds(), Rect::default());
    }
}
