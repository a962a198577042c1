//! Keyword highlight: translucent fill, solid outline and a category pill
//! above the region.

use super::color::{parse_color, with_alpha};
use super::{AnnotationRenderer, DrawingSurface, RenderBounds};
use crate::annotation::Annotation;
use crate::error::DrawError;
use image::Rgba;
use tracing::debug;

pub const KEYWORD_PRIORITY: i32 = 100;
const OUTLINE_WIDTH: u32 = 2;
const LABEL_PADDING: i32 = 2;
const LABEL_GAP: i32 = 6;
const LABEL_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone)]
pub struct KeywordRenderer {
    fill_alpha: u8,
    labels: bool,
}

impl Default for KeywordRenderer {
    fn default() -> Self {
        Self::new(80)
    }
}

impl KeywordRenderer {
    /// `fill_alpha` is the opacity of the highlight fill (0-255).
    pub fn new(fill_alpha: u8) -> Self {
        Self {
            fill_alpha,
            labels: true,
        }
    }

    /// Disable the category pill.
    pub fn without_labels(mut self) -> Self {
        self.labels = false;
        self
    }

    fn draw_label(
        &self,
        category: &str,
        color: Rgba<u8>,
        surface: &mut dyn DrawingSurface,
        bounds: RenderBounds,
    ) -> Result<(), DrawError> {
        let label = format!(" {} ", category);
        let (tw, th) = surface.text_size(&label)?;
        let (tw, th) = (tw as i32, th as i32);
        let (sw, _) = surface.size();

        let x = bounds.x0.clamp(0, (sw as i32 - 1).max(0));
        let y = (bounds.y0 - th - LABEL_GAP).max(0);
        let pill = RenderBounds::new(x, y, x + tw + 2 * LABEL_PADDING, y + th + 2 * LABEL_PADDING);

        surface.fill_rect(pill, color);
        surface.draw_text(x + LABEL_PADDING, y + LABEL_PADDING, &label, LABEL_TEXT)
    }
}

impl AnnotationRenderer for KeywordRenderer {
    fn priority(&self) -> i32 {
        KEYWORD_PRIORITY
    }

    fn render(&self, annotation: &Annotation, surface: &mut dyn DrawingSurface, bounds: RenderBounds) {
        let color = parse_color(annotation.color());
        surface.fill_rect(bounds, with_alpha(color, self.fill_alpha));
        surface.outline_rect(bounds, color, OUTLINE_WIDTH);

        if !self.labels {
            return;
        }
        if let Err(e) = self.draw_label(annotation.category(), color, surface, bounds) {
            debug!("Keyword label for '{}' skipped: {}", annotation.text(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationKind;
    use crate::render::ImageSurface;
    use image::RgbaImage;

    fn hazard() -> Annotation {
        Annotation::new("flood", AnnotationKind::Keyword, "Hazard", "#0000FF").unwrap()
    }

    #[test]
    fn highlights_without_font() {
        let mut img = RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]));
        let mut surface = ImageSurface::new(&mut img);
        KeywordRenderer::default().render(&hazard(), &mut surface, RenderBounds::new(10, 10, 29, 29));

        // Outline is solid blue, interior is a blue tint, outside untouched.
        assert_eq!(*img.get_pixel(10, 20), Rgba([0, 0, 255, 255]));
        let inner = img.get_pixel(20, 20);
        assert!(inner[2] == 255 && inner[0] < 255 && inner[0] > 100, "got {:?}", inner);
        assert_eq!(*img.get_pixel(2, 2), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn region_off_canvas_does_not_panic() {
        let mut img = RgbaImage::new(8, 8);
        let mut surface = ImageSurface::new(&mut img);
        KeywordRenderer::default().render(&hazard(), &mut surface, RenderBounds::new(-50, -50, -40, -40));
        KeywordRenderer::default().render(&hazard(), &mut surface, RenderBounds::new(100, 100, 120, 120));
    }

    #[test]
    fn priority_is_foreground() {
        assert_eq!(KeywordRenderer::default().priority(), 100);
    }
}
