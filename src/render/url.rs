//! URL status frame: a thick border just outside the region plus a status
//! dot in its top-right corner.

use super::color::parse_color;
use super::{AnnotationRenderer, DrawingSurface, RenderBounds};
use crate::annotation::Annotation;
use image::Rgba;

pub const URL_PRIORITY: i32 = 50;
const FRAME_MARGIN: i32 = 2;
const FRAME_WIDTH: u32 = 3;
const DOT_SIZE: i32 = 8;
const DOT_RING: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, Default)]
pub struct UrlRenderer;

impl UrlRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl AnnotationRenderer for UrlRenderer {
    fn priority(&self) -> i32 {
        URL_PRIORITY
    }

    fn render(&self, annotation: &Annotation, surface: &mut dyn DrawingSurface, bounds: RenderBounds) {
        let color = parse_color(annotation.color());
        surface.outline_rect(bounds.expand(FRAME_MARGIN), color, FRAME_WIDTH);

        let dot_x = bounds.x1 - DOT_SIZE - 2;
        let dot_y = bounds.y0 + 2;
        let dot = RenderBounds::new(dot_x, dot_y, dot_x + DOT_SIZE, dot_y + DOT_SIZE);
        surface.fill_ellipse(dot, color);
        surface.outline_ellipse(dot, DOT_RING);
    }
}
