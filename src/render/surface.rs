//! Drawing surface abstraction and its raster implementation.
//!
//! Renderers never touch pixel buffers directly; they draw through
//! [`DrawingSurface`]. [`ImageSurface`] implements it on top of an
//! [`RgbaImage`] with `imageproc` primitives and `ab_glyph` text.
//!
//! Every primitive clips to the canvas. Shapes that fall entirely outside
//! draw nothing rather than failing.

use crate::error::DrawError;
use crate::render::RenderBounds;
use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_ellipse_mut, draw_hollow_ellipse_mut, draw_hollow_rect_mut, draw_text_mut,
    text_size,
};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Primitive operations renderers draw with.
pub trait DrawingSurface {
    /// Canvas size in pixels.
    fn size(&self) -> (u32, u32);

    /// Fill `bounds`, blending by the color's alpha.
    fn fill_rect(&mut self, bounds: RenderBounds, color: Rgba<u8>);

    /// Stroke the inside edge of `bounds` with a `width`-pixel outline.
    fn outline_rect(&mut self, bounds: RenderBounds, color: Rgba<u8>, width: u32);

    /// Fill the ellipse inscribed in `bounds`.
    fn fill_ellipse(&mut self, bounds: RenderBounds, color: Rgba<u8>);

    /// Stroke the ellipse inscribed in `bounds`.
    fn outline_ellipse(&mut self, bounds: RenderBounds, color: Rgba<u8>);

    /// Draw `text` with its top-left corner at `(x, y)`.
    fn draw_text(&mut self, x: i32, y: i32, text: &str, color: Rgba<u8>) -> Result<(), DrawError>;

    /// Pixel extent `(width, height)` of `text` in the label font.
    fn text_size(&self, text: &str) -> Result<(u32, u32), DrawError>;
}

/// [`DrawingSurface`] over a mutable RGBA image.
pub struct ImageSurface<'a> {
    image: &'a mut RgbaImage,
    font: Option<&'a FontArc>,
    scale: PxScale,
}

impl<'a> ImageSurface<'a> {
    /// A surface without a label font; text operations fail with
    /// [`DrawError::NoFont`].
    pub fn new(image: &'a mut RgbaImage) -> Self {
        Self {
            image,
            font: None,
            scale: PxScale::from(12.0),
        }
    }

    pub fn with_font(mut self, font: &'a FontArc, px: f32) -> Self {
        self.font = Some(font);
        self.scale = PxScale::from(px);
        self
    }

    pub fn with_optional_font(self, font: Option<&'a FontArc>, px: f32) -> Self {
        match font {
            Some(f) => self.with_font(f, px),
            None => self,
        }
    }

    fn clip(&self, bounds: RenderBounds) -> Option<RenderBounds> {
        bounds.clip(self.image.width(), self.image.height())
    }
}

fn rect_of(bounds: RenderBounds) -> Rect {
    Rect::at(bounds.x0, bounds.y0).of_size(bounds.width(), bounds.height())
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let a = src[3] as u32;
    if a == 255 {
        *dst = src;
        return;
    }
    for c in 0..3 {
        let mixed = (src[c] as u32 * a + dst[c] as u32 * (255 - a) + 127) / 255;
        dst[c] = mixed as u8;
    }
    dst[3] = (a + dst[3] as u32 * (255 - a) / 255).min(255) as u8;
}

impl DrawingSurface for ImageSurface<'_> {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn fill_rect(&mut self, bounds: RenderBounds, color: Rgba<u8>) {
        let Some(b) = self.clip(bounds) else { return };
        for y in b.y0..=b.y1 {
            for x in b.x0..=b.x1 {
                blend(self.image.get_pixel_mut(x as u32, y as u32), color);
            }
        }
    }

    fn outline_rect(&mut self, bounds: RenderBounds, color: Rgba<u8>, width: u32) {
        // Nested one-pixel frames; imageproc clips each to the canvas.
        for t in 0..width as i32 {
            match bounds.inset(t) {
                Some(inner) => draw_hollow_rect_mut(self.image, rect_of(inner), color),
                None => break,
            }
        }
    }

    fn fill_ellipse(&mut self, bounds: RenderBounds, color: Rgba<u8>) {
        if self.clip(bounds).is_none() {
            return;
        }
        let (center, rx, ry) = ellipse_params(bounds);
        draw_filled_ellipse_mut(self.image, center, rx, ry, color);
    }

    fn outline_ellipse(&mut self, bounds: RenderBounds, color: Rgba<u8>) {
        if self.clip(bounds).is_none() {
            return;
        }
        let (center, rx, ry) = ellipse_params(bounds);
        draw_hollow_ellipse_mut(self.image, center, rx, ry, color);
    }

    fn draw_text(&mut self, x: i32, y: i32, text: &str, color: Rgba<u8>) -> Result<(), DrawError> {
        let font = self.font.ok_or(DrawError::NoFont)?;
        let (w, h) = self.image.dimensions();
        if x >= w as i32 || y >= h as i32 {
            return Err(DrawError::OutOfBounds {
                x,
                y,
                width: w,
                height: h,
            });
        }
        draw_text_mut(self.image, color, x, y, self.scale, font, text);
        Ok(())
    }

    fn text_size(&self, text: &str) -> Result<(u32, u32), DrawError> {
        let font = self.font.ok_or(DrawError::NoFont)?;
        Ok(text_size(self.scale, font, text))
    }
}

fn ellipse_params(b: RenderBounds) -> ((i32, i32), i32, i32) {
    let center = ((b.x0 + b.x1) / 2, (b.y0 + b.y1) / 2);
    let rx = ((b.x1 - b.x0) / 2).max(0);
    let ry = ((b.y1 - b.y0) / 2).max(0);
    (center, rx, ry)
}

/// Common system locations for a sans-serif TTF, tried in order.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Load the label font from `explicit`, or the first system font found.
///
/// Returns `None` when nothing loads; labels are then skipped.
pub fn load_label_font(explicit: Option<&Path>) -> Option<FontArc> {
    let candidates: Vec<PathBuf> = match explicit {
        Some(p) => vec![p.to_path_buf()],
        None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
    };
    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                debug!("Loaded label font from {}", path.display());
                return Some(font);
            }
            Err(e) => warn!("Ignoring unusable font {}: {}", path.display(), e),
        }
    }
    if explicit.is_some() {
        warn!("Label font could not be loaded; labels will be omitted");
    } else {
        debug!("No system label font found; labels will be omitted");
    }
    None
}
