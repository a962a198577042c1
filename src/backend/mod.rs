//! Document backends: open a document, read its pages' text and geometry,
//! rasterise pages.
//!
//! The pipeline is generic over [`DocumentBackend`]. Two implementations
//! ship with the crate:
//!
//! - [`PdfiumBackend`]: real PDFs through `pdfium-render`
//! - [`MemoryBackend`]: in-memory documents (text spans on blank pages)
//!
//! All backend calls are blocking. Async callers go through
//! [`crate::pipeline::worker::RenderWorker`], which runs them on the
//! blocking thread pool.

pub mod memory;
pub mod pdfium;

pub use memory::{MemoryBackend, MemoryDocument, MemoryPage};
pub use pdfium::PdfiumBackend;

use crate::error::AnnotateError;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Document-level metadata. Empty fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub pdf_version: Option<String>,
}

/// A run of page text with its bounding box.
///
/// Coordinates are PDF points with a top-left origin, so `y0 < y1` reads
/// top to bottom like image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            text: text.into(),
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }
}

/// Access to one document format.
///
/// `Document` is the opened handle; `Page` a loaded page of it. Both are
/// owned values so the pipeline can hold them across stage calls.
pub trait DocumentBackend: Send + Sync {
    type Document: Send;
    type Page: Send;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn open(&self, path: &Path, password: Option<&str>) -> Result<Self::Document, AnnotateError>;

    fn page_count(&self, doc: &Self::Document) -> usize;

    fn metadata(&self, doc: &Self::Document) -> DocumentMetadata;

    /// Load page `index` (0-based). Out-of-range indices fail with
    /// [`AnnotateError::PageOutOfRange`].
    fn load_page(&self, doc: &Self::Document, index: usize) -> Result<Self::Page, AnnotateError>;

    /// Page size in points.
    fn page_size(&self, page: &Self::Page) -> (f32, f32);

    /// Full page text in reading order.
    fn text(&self, doc: &Self::Document, page: &Self::Page) -> Result<String, AnnotateError>;

    /// Text runs with bounding boxes.
    fn text_spans(&self, doc: &Self::Document, page: &Self::Page) -> Result<Vec<TextSpan>, AnnotateError>;

    /// Rasterise the page at `dpi`.
    fn rasterize(&self, doc: &Self::Document, page: &Self::Page, dpi: f32) -> Result<RgbaImage, AnnotateError>;
}

/// Validate that `path` exists, is readable and starts with `%PDF`.
///
/// Files shorter than the magic are rejected, with the missing bytes of
/// `magic` left as zero.
pub(crate) fn check_pdf_file(path: &Path) -> Result<Vec<u8>, AnnotateError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AnnotateError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(AnnotateError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };
    if !bytes.starts_with(b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(AnnotateError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(bytes)
}
