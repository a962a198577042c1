//! Rendering strategies: turn annotations plus region bounds into overlay
//! drawing on a [`DrawingSurface`].
//!
//! Each renderer reports a fixed [`AnnotationRenderer::priority`]. The
//! registry sorts annotations by it, so lower priorities are drawn first and
//! end up underneath:
//!
//! | Renderer | Priority | Layer |
//! |----------|----------|-------|
//! | [`UrlRenderer`] | 50 | background status frame |
//! | [`KeywordRenderer`] | 100 | foreground term highlight |

pub mod color;
pub mod keyword;
pub mod surface;
pub mod url;

pub use color::parse_color;
pub use keyword::KeywordRenderer;
pub use surface::{DrawingSurface, ImageSurface};
pub use url::UrlRenderer;

use crate::annotation::Annotation;
use serde::{Deserialize, Serialize};

/// Draws annotations of one kind.
pub trait AnnotationRenderer: Send + Sync {
    /// Lower draws first (background), higher draws last (foreground).
    fn priority(&self) -> i32;

    /// Draw `annotation` within `bounds`. Must not panic for a well-formed
    /// annotation; decoration failures degrade to the primary shape.
    fn render(&self, annotation: &Annotation, surface: &mut dyn DrawingSurface, bounds: RenderBounds);
}

/// A rectangle in output-image pixel coordinates (top-left origin).
/// `x1`/`y1` are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderBounds {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl RenderBounds {
    /// Build from two corners in any order.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Scale a box given in PDF points (top-left origin) to pixels.
    pub fn from_points(x0: f32, y0: f32, x1: f32, y1: f32, scale: f32) -> Self {
        Self::new(
            (x0 * scale).round() as i32,
            (y0 * scale).round() as i32,
            (x1 * scale).round() as i32,
            (y1 * scale).round() as i32,
        )
    }

    /// Width in pixels, saturating at `u32::MAX`.
    pub fn width(&self) -> u32 {
        extent(self.x0, self.x1)
    }

    /// Height in pixels, saturating at `u32::MAX`.
    pub fn height(&self) -> u32 {
        extent(self.y0, self.y1)
    }

    /// Grow by `by` pixels on every side. Edges saturate at the `i32` range.
    pub fn expand(&self, by: i32) -> Self {
        Self::new(
            self.x0.saturating_sub(by),
            self.y0.saturating_sub(by),
            self.x1.saturating_add(by),
            self.y1.saturating_add(by),
        )
    }

    /// Shrink by `by` pixels on every side, or `None` once nothing is left.
    pub fn inset(&self, by: i32) -> Option<Self> {
        let inner = Self {
            x0: self.x0.saturating_add(by),
            y0: self.y0.saturating_add(by),
            x1: self.x1.saturating_sub(by),
            y1: self.y1.saturating_sub(by),
        };
        (inner.x0 <= inner.x1 && inner.y0 <= inner.y1).then_some(inner)
    }

    /// Intersection with a `width`×`height` canvas, if any part is visible.
    pub fn clip(&self, width: u32, height: u32) -> Option<Self> {
        let clipped = Self {
            x0: self.x0.max(0),
            y0: self.y0.max(0),
            x1: self.x1.min(last_pixel(width)),
            y1: self.y1.min(last_pixel(height)),
        };
        (clipped.x0 <= clipped.x1 && clipped.y0 <= clipped.y1).then_some(clipped)
    }
}

/// Inclusive pixel count from `lo` to `hi`; 0 when `hi < lo`.
fn extent(lo: i32, hi: i32) -> u32 {
    let n = i64::from(hi) - i64::from(lo) + 1;
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}

fn last_pixel(len: u32) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_orders_corners() {
        let b = RenderBounds::new(10, 20, 0, 5);
        assert_eq!(b, RenderBounds { x0: 0, y0: 5, x1: 10, y1: 20 });
        assert_eq!(b.width(), 11);
        assert_eq!(b.height(), 16);
    }

    #[test]
    fn from_points_scales() {
        let b = RenderBounds::from_points(72.0, 36.0, 144.0, 72.0, 2.0);
        assert_eq!(b, RenderBounds { x0: 144, y0: 72, x1: 288, y1: 144 });
    }

    #[test]
    fn inset_and_clip() {
        let b = RenderBounds::new(0, 0, 3, 3);
        assert_eq!(b.inset(1), Some(RenderBounds::new(1, 1, 2, 2)));
        assert_eq!(b.inset(2), None);
        assert_eq!(
            RenderBounds::new(-5, -5, 5, 5).clip(4, 4),
            Some(RenderBounds::new(0, 0, 3, 3))
        );
        assert_eq!(RenderBounds::new(10, 10, 12, 12).clip(4, 4), None);
    }

    #[test]
    fn extreme_bounds_saturate() {
        let full = RenderBounds::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(full.width(), u32::MAX);
        assert_eq!(full.height(), u32::MAX);
        assert_eq!(full.expand(4), full);
        assert_eq!(full.inset(i32::MAX), Some(RenderBounds::new(-1, -1, 0, 0)));

        let edge = RenderBounds::new(i32::MAX - 1, 0, i32::MAX, 1);
        assert_eq!(edge.width(), 2);
        assert_eq!(edge.expand(10), RenderBounds::new(i32::MAX - 11, -10, i32::MAX, 11));
        assert_eq!(edge.clip(u32::MAX, 4), Some(RenderBounds::new(i32::MAX - 1, 0, i32::MAX - 1, 1)));

        let inverted = RenderBounds { x0: 5, y0: 5, x1: 1, y1: 1 };
        assert_eq!(inverted.width(), 0);
        assert_eq!(inverted.height(), 0);
    }
}
