//! Configuration types for page annotation.
//!
//! Every rendering and caching knob lives in [`AnnotatorConfig`], built via
//! its [`AnnotatorConfigBuilder`]. The config is cheap to clone and is shared
//! by the registry (cache capacity, palettes), the renderers (alpha, label
//! font) and the pipeline (DPI, zoom range, password).

use crate::error::AnnotateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Configuration for annotating a document.
///
/// # Example
/// ```rust
/// use pdf_annotate::AnnotatorConfig;
///
/// let config = AnnotatorConfig::builder()
///     .dpi(150)
///     .cache_capacity(512)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 150);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    /// Rasterisation DPI at zoom 1.0. Range: 72–600. Default: 150.
    ///
    /// Page text boxes are in PDF points (1/72 in), so overlay coordinates
    /// are scaled by `dpi * zoom / 72`.
    pub dpi: u32,

    /// Smallest accepted zoom; smaller requests are clamped. Default: 0.25.
    pub min_zoom: f32,

    /// Largest accepted zoom; larger requests are clamped. Default: 5.0.
    pub max_zoom: f32,

    /// Upper bound on the longest edge of a rasterised page, in pixels.
    /// Default: 4096. Minimum: 100.
    ///
    /// DPI and zoom multiply: a letter page at 600 DPI and zoom 5 would be
    /// 33,000 px tall. When `dpi * zoom` would exceed this edge, the effective
    /// zoom is reduced to fit, even below `min_zoom`.
    pub max_rendered_pixels: u32,

    /// Number of distinct page texts whose annotations are cached. Default: 256.
    pub cache_capacity: usize,

    /// Category → color token used when a keyword row has no color.
    pub keyword_colors: ColorPalette,

    /// URL validation status → color token.
    pub status_colors: ColorPalette,

    /// Opacity (0–255) of the keyword highlight fill. Default: 80.
    pub highlight_alpha: u8,

    /// Font file for keyword category labels. Without one, labels are skipped
    /// and only the highlight box is drawn.
    pub label_font: Option<PathBuf>,

    /// Label glyph height in pixels. Default: 12.
    pub label_font_px: f32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory containing the pdfium shared library. `None` binds the
    /// system library.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            min_zoom: 0.25,
            max_zoom: 5.0,
            max_rendered_pixels: 4096,
            cache_capacity: 256,
            keyword_colors: ColorPalette::keyword_defaults(),
            status_colors: ColorPalette::status_defaults(),
            highlight_alpha: 80,
            label_font: None,
            label_font_px: 12.0,
            password: None,
            pdfium_library_path: None,
        }
    }
}

impl AnnotatorConfig {
    /// Create a new builder for `AnnotatorConfig`.
    pub fn builder() -> AnnotatorConfigBuilder {
        AnnotatorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Validate a requested zoom and clamp it into `[min_zoom, max_zoom]`.
    pub fn clamp_zoom(&self, zoom: f32) -> Result<f32, AnnotateError> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(AnnotateError::InvalidZoom(zoom));
        }
        Ok(zoom.clamp(self.min_zoom, self.max_zoom))
    }

    /// Reduce `zoom` so a page whose longest edge is `longest_edge_pt` points
    /// rasterises within `max_rendered_pixels`.
    pub fn cap_zoom(&self, zoom: f32, longest_edge_pt: f32) -> f32 {
        if !(longest_edge_pt.is_finite() && longest_edge_pt > 0.0) {
            return zoom;
        }
        let fit = self.max_rendered_pixels as f32 * 72.0 / (self.dpi as f32 * longest_edge_pt);
        zoom.min(fit)
    }

    /// Pixels per PDF point at the given zoom.
    pub fn scale(&self, zoom: f32) -> f32 {
        self.dpi as f32 * zoom / 72.0
    }
}

/// Builder for [`AnnotatorConfig`].
#[derive(Debug)]
pub struct AnnotatorConfigBuilder {
    config: AnnotatorConfig,
}

impl AnnotatorConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn zoom_range(mut self, min: f32, max: f32) -> Self {
        self.config.min_zoom = min;
        self.config.max_zoom = max;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn cache_capacity(mut self, n: usize) -> Self {
        self.config.cache_capacity = n;
        self
    }

    pub fn keyword_colors(mut self, palette: ColorPalette) -> Self {
        self.config.keyword_colors = palette;
        self
    }

    pub fn status_colors(mut self, palette: ColorPalette) -> Self {
        self.config.status_colors = palette;
        self
    }

    pub fn highlight_alpha(mut self, alpha: u8) -> Self {
        self.config.highlight_alpha = alpha;
        self
    }

    pub fn label_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.label_font = Some(path.into());
        self
    }

    pub fn label_font_px(mut self, px: f32) -> Self {
        self.config.label_font_px = px;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnnotatorConfig, AnnotateError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(AnnotateError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if !(c.min_zoom.is_finite() && c.max_zoom.is_finite())
            || c.min_zoom <= 0.0
            || c.min_zoom > c.max_zoom
        {
            return Err(AnnotateError::InvalidConfig(format!(
                "zoom range must satisfy 0 < min ≤ max, got {}–{}",
                c.min_zoom, c.max_zoom
            )));
        }
        if c.max_rendered_pixels < 100 {
            return Err(AnnotateError::InvalidConfig(format!(
                "max rendered pixels must be ≥ 100, got {}",
                c.max_rendered_pixels
            )));
        }
        if c.cache_capacity == 0 {
            return Err(AnnotateError::InvalidConfig(
                "cache capacity must be ≥ 1".into(),
            ));
        }
        if !(c.label_font_px.is_finite() && c.label_font_px > 0.0) {
            return Err(AnnotateError::InvalidConfig(format!(
                "label font size must be positive, got {}",
                c.label_font_px
            )));
        }
        Ok(self.config)
    }
}

// ── Palettes ─────────────────────────────────────────────────────────────

/// Maps a category or status label to a color token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPalette {
    colors: BTreeMap<String, String>,
    fallback: String,
}

impl ColorPalette {
    pub const FALLBACK: &'static str = "#808080";

    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            colors: BTreeMap::new(),
            fallback: fallback.into(),
        }
    }

    pub fn with(mut self, label: impl Into<String>, color: impl Into<String>) -> Self {
        self.colors.insert(label.into(), color.into());
        self
    }

    /// Color for `label`, or the fallback.
    pub fn color_for(&self, label: &str) -> &str {
        self.colors
            .get(label)
            .map(String::as_str)
            .unwrap_or(self.fallback.as_str())
    }

    /// Keyword category colors.
    pub fn keyword_defaults() -> Self {
        Self::new(Self::FALLBACK)
            .with("Required", "#FF0000")
            .with("Recommended", "#FFA500")
            .with("Prohibited", "#000000")
            .with("Hazard", "#0000FF")
            .with("Domain", "#008000")
    }

    /// URL validation status colors.
    pub fn status_defaults() -> Self {
        Self::new(Self::FALLBACK)
            .with("PASS", "#00AA00")
            .with("FAIL", "#CC0000")
            .with("WARN_CONTENT_ERROR", "#FF8800")
            .with("EMAIL", "#0066CC")
            .with("INVALID", "#808080")
            .with("PROCESSING_ERROR", "#404040")
            .with("BATCH_MISSING_RESULT", "#666666")
            .with("NOT_MAPPED", "#999999")
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of the PDF to annotate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Parse `all`, `5`, `3-15` or `1,3,5`.
    pub fn parse(s: &str) -> Result<Self, AnnotateError> {
        let s = s.trim();
        let bad = || AnnotateError::InvalidConfig(format!("invalid page selection '{s}'"));
        if s.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }
        if let Some((a, b)) = s.split_once('-') {
            let a = a.trim().parse().map_err(|_| bad())?;
            let b = b.trim().parse().map_err(|_| bad())?;
            return Ok(PageSelection::Range(a, b));
        }
        if s.contains(',') {
            let pages = s
                .split(',')
                .map(|p| p.trim().parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| bad())?;
            return Ok(PageSelection::Set(pages));
        }
        s.parse().map(PageSelection::Single).map_err(|_| bad())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let c = AnnotatorConfig::builder().build().unwrap();
        assert_eq!(c.dpi, 150);
        assert_eq!(c.cache_capacity, 256);
        assert_eq!(c.highlight_alpha, 80);
    }

    #[test]
    fn rejects_zero_capacity_and_bad_dpi() {
        assert!(AnnotatorConfig::builder().cache_capacity(0).build().is_err());
        assert!(AnnotatorConfig::builder().dpi(20).build().is_err());
        assert!(AnnotatorConfig::builder().zoom_range(2.0, 1.0).build().is_err());
    }

    #[test]
    fn zoom_is_clamped_and_validated() {
        let c = AnnotatorConfig::default();
        assert_eq!(c.clamp_zoom(10.0).unwrap(), 5.0);
        assert_eq!(c.clamp_zoom(0.1).unwrap(), 0.25);
        assert_eq!(c.clamp_zoom(1.5).unwrap(), 1.5);
        assert!(matches!(c.clamp_zoom(0.0), Err(AnnotateError::InvalidZoom(_))));
        assert!(c.clamp_zoom(f32::NAN).is_err());
    }

    #[test]
    fn zoom_is_capped_by_longest_edge() {
        let c = AnnotatorConfig::builder()
            .dpi(600)
            .max_rendered_pixels(6000)
            .build()
            .unwrap();
        // 792 pt at 600 DPI is 6600 px at zoom 1.
        let capped = c.cap_zoom(5.0, 792.0);
        assert!((capped - 6000.0 / 6600.0).abs() < 1e-6);
        assert_eq!(c.cap_zoom(0.5, 792.0), 0.5);
        assert_eq!(c.cap_zoom(2.0, 0.0), 2.0);
        assert_eq!(AnnotatorConfig::builder().max_rendered_pixels(10).build().unwrap().max_rendered_pixels, 100);
    }

    #[test]
    fn palettes_fall_back_to_gray() {
        let p = ColorPalette::status_defaults();
        assert_eq!(p.color_for("PASS"), "#00AA00");
        assert_eq!(p.color_for("SOMETHING_NEW"), ColorPalette::FALLBACK);
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).to_indices(5), vec![1, 2, 3]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2] // deduplicated and sorted
        );
    }

    #[test]
    fn page_selection_parse() {
        assert_eq!(PageSelection::parse("all").unwrap(), PageSelection::All);
        assert_eq!(PageSelection::parse("4").unwrap(), PageSelection::Single(4));
        assert_eq!(PageSelection::parse("2-5").unwrap(), PageSelection::Range(2, 5));
        assert_eq!(
            PageSelection::parse("1, 3,5").unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert!(PageSelection::parse("one").is_err());
    }
}
