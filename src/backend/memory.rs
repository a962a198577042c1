//! In-memory documents.
//!
//! Pages are a size in points plus positioned text spans; rasterisation
//! produces a blank white page of the right pixel size. Documents are
//! registered under a path and `open` looks them up there.

use super::{DocumentBackend, DocumentMetadata, TextSpan};
use crate::error::AnnotateError;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// US Letter, in points.
const LETTER: (f32, f32) = (612.0, 792.0);
const LINE_HEIGHT: f32 = 14.0;
const MARGIN: f32 = 72.0;
/// Rough advance per character for auto-placed lines.
const CHAR_WIDTH: f32 = 6.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPage {
    width_pt: f32,
    height_pt: f32,
    spans: Vec<TextSpan>,
    raster_error: Option<String>,
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self::new(LETTER.0, LETTER.1)
    }
}

impl MemoryPage {
    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self {
            width_pt,
            height_pt,
            spans: Vec::new(),
            raster_error: None,
        }
    }

    /// A letter-size page with one auto-placed span per line of `text`.
    pub fn from_text(text: &str) -> Self {
        text.lines().fold(Self::default(), |page, line| page.with_line(line))
    }

    pub fn with_span(mut self, span: TextSpan) -> Self {
        self.spans.push(span);
        self
    }

    /// Append `line` below the previous span, left-aligned at the margin.
    pub fn with_line(self, line: &str) -> Self {
        let y0 = self.spans.last().map_or(MARGIN, |s| s.y1 + 2.0);
        let x1 = MARGIN + line.chars().count() as f32 * CHAR_WIDTH;
        self.with_span(TextSpan::new(line, MARGIN, y0, x1, y0 + LINE_HEIGHT))
    }

    /// Make every rasterisation of this page fail with `detail`.
    pub fn with_raster_error(mut self, detail: impl Into<String>) -> Self {
        self.raster_error = Some(detail.into());
        self
    }

    pub fn spans(&self) -> &[TextSpan] {
        &self.spans
    }

    fn text(&self) -> String {
        self.spans
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryDocument {
    pub metadata: DocumentMetadata,
    pub pages: Vec<MemoryPage>,
}

impl MemoryDocument {
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        Self {
            metadata: DocumentMetadata::default(),
            pages,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }
}

/// [`DocumentBackend`] over registered [`MemoryDocument`]s.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    documents: HashMap<PathBuf, MemoryDocument>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, path: impl Into<PathBuf>, doc: MemoryDocument) -> Self {
        self.documents.insert(path.into(), doc);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, doc: MemoryDocument) {
        self.documents.insert(path.into(), doc);
    }
}

impl DocumentBackend for MemoryBackend {
    type Document = MemoryDocument;
    type Page = (usize, MemoryPage);

    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self, path: &Path, _password: Option<&str>) -> Result<MemoryDocument, AnnotateError> {
        self.documents
            .get(path)
            .cloned()
            .ok_or_else(|| AnnotateError::FileNotFound {
                path: path.to_path_buf(),
            })
    }

    fn page_count(&self, doc: &MemoryDocument) -> usize {
        doc.pages.len()
    }

    fn metadata(&self, doc: &MemoryDocument) -> DocumentMetadata {
        doc.metadata.clone()
    }

    fn load_page(&self, doc: &MemoryDocument, index: usize) -> Result<(usize, MemoryPage), AnnotateError> {
        doc.pages
            .get(index)
            .cloned()
            .map(|p| (index, p))
            .ok_or(AnnotateError::PageOutOfRange {
                page: index,
                total: doc.pages.len(),
            })
    }

    fn page_size(&self, page: &(usize, MemoryPage)) -> (f32, f32) {
        (page.1.width_pt, page.1.height_pt)
    }

    fn text(&self, _doc: &MemoryDocument, page: &(usize, MemoryPage)) -> Result<String, AnnotateError> {
        Ok(page.1.text())
    }

    fn text_spans(&self, _doc: &MemoryDocument, page: &(usize, MemoryPage)) -> Result<Vec<TextSpan>, AnnotateError> {
        Ok(page.1.spans.clone())
    }

    fn rasterize(&self, _doc: &MemoryDocument, page: &(usize, MemoryPage), dpi: f32) -> Result<RgbaImage, AnnotateError> {
        let (index, page) = page;
        if let Some(detail) = &page.raster_error {
            return Err(AnnotateError::RasterisationFailed {
                page: index + 1,
                detail: detail.clone(),
            });
        }
        let scale = dpi / 72.0;
        let w = (page.width_pt * scale).round().max(1.0) as u32;
        let h = (page.height_pt * scale).round().max(1.0) as u32;
        Ok(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MemoryBackend {
        MemoryBackend::new().with_document(
            "doc.pdf",
            MemoryDocument::new(vec![
                MemoryPage::from_text("first line\nsecond line"),
                MemoryPage::new(100.0, 50.0),
            ])
            .with_title("Doc"),
        )
    }

    #[test]
    fn open_and_read_pages() {
        let b = backend();
        let doc = b.open(Path::new("doc.pdf"), None).unwrap();
        assert_eq!(b.page_count(&doc), 2);
        assert_eq!(b.metadata(&doc).title.as_deref(), Some("Doc"));

        let page = b.load_page(&doc, 0).unwrap();
        assert_eq!(b.text(&doc, &page).unwrap(), "first line\nsecond line");
        let spans = b.text_spans(&doc, &page).unwrap();
        assert_eq!(spans.len(), 2);
        assert!(spans[1].y0 > spans[0].y1);
    }

    #[test]
    fn unknown_path_and_page_fail() {
        let b = backend();
        assert!(matches!(
            b.open(Path::new("other.pdf"), None),
            Err(AnnotateError::FileNotFound { .. })
        ));
        let doc = b.open(Path::new("doc.pdf"), None).unwrap();
        assert!(matches!(
            b.load_page(&doc, 2),
            Err(AnnotateError::PageOutOfRange { page: 2, total: 2 })
        ));
    }

    #[test]
    fn rasterize_scales_by_dpi() {
        let b = backend();
        let doc = b.open(Path::new("doc.pdf"), None).unwrap();
        let page = b.load_page(&doc, 1).unwrap();
        let img = b.rasterize(&doc, &page, 144.0).unwrap();
        assert_eq!(img.dimensions(), (200, 100));
    }
}
