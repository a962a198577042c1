//! PDF access through pdfium.
//!
//! A pdfium document borrows the `Pdfium` binding it was loaded with, so it
//! cannot live in a long-lived handle. The backend reads the file bytes once
//! at `open` and re-binds and re-loads from those bytes for each page
//! operation. `load_page` pulls text, spans and page size in one pass;
//! `rasterize` is the only other call that touches pdfium again.

use super::{check_pdf_file, DocumentBackend, DocumentMetadata, TextSpan};
use crate::config::AnnotatorConfig;
use crate::error::AnnotateError;
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// [`DocumentBackend`] over the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    /// Directory holding libpdfium. `None` tries the working directory and
    /// then the system library path.
    library_dir: Option<PathBuf>,
}

/// An opened PDF: its bytes plus what `open` already read.
pub struct PdfiumDocument {
    path: PathBuf,
    bytes: Vec<u8>,
    password: Option<String>,
    page_count: usize,
    metadata: DocumentMetadata,
}

/// A loaded page. Text and geometry are read eagerly.
pub struct PdfiumPage {
    index: usize,
    width_pt: f32,
    height_pt: f32,
    text: String,
    spans: Vec<TextSpan>,
}

impl PdfiumBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: Some(dir.into()),
        }
    }

    /// Backend bound as `config.pdfium_library_path` asks.
    pub fn from_config(config: &AnnotatorConfig) -> Self {
        Self {
            library_dir: config.pdfium_library_path.clone(),
        }
    }

    fn bind(&self) -> Result<Pdfium, AnnotateError> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| AnnotateError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

fn load_error(path: &Path, password: Option<&str>, e: PdfiumError) -> AnnotateError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            AnnotateError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            AnnotateError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        AnnotateError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        pdf_version: Some(format!("{:?}", document.version())),
    }
}

impl DocumentBackend for PdfiumBackend {
    type Document = PdfiumDocument;
    type Page = PdfiumPage;

    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn open(&self, path: &Path, password: Option<&str>) -> Result<PdfiumDocument, AnnotateError> {
        let bytes = check_pdf_file(path)?;
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&bytes, password)
            .map_err(|e| load_error(path, password, e))?;

        let page_count = document.pages().len() as usize;
        let metadata = read_metadata(&document);
        drop(document);
        info!("PDF loaded: {} pages ({})", page_count, path.display());

        Ok(PdfiumDocument {
            path: path.to_path_buf(),
            bytes,
            password: password.map(str::to_string),
            page_count,
            metadata,
        })
    }

    fn page_count(&self, doc: &PdfiumDocument) -> usize {
        doc.page_count
    }

    fn metadata(&self, doc: &PdfiumDocument) -> DocumentMetadata {
        doc.metadata.clone()
    }

    fn load_page(&self, doc: &PdfiumDocument, index: usize) -> Result<PdfiumPage, AnnotateError> {
        if index >= doc.page_count {
            return Err(AnnotateError::PageOutOfRange {
                page: index,
                total: doc.page_count,
            });
        }
        let extraction_failed = |e: PdfiumError| AnnotateError::TextExtractionFailed {
            page: index + 1,
            detail: format!("{:?}", e),
        };

        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&doc.bytes, doc.password.as_deref())
            .map_err(|e| load_error(&doc.path, doc.password.as_deref(), e))?;
        let page = document.pages().get(index as u16).map_err(extraction_failed)?;

        let width_pt = page.width().value;
        let height_pt = page.height().value;
        let text_page = page.text().map_err(extraction_failed)?;
        let text = text_page.all();

        let mut spans = Vec::new();
        for segment in text_page.segments().iter() {
            let content = segment.text();
            let content = content.trim();
            if content.is_empty() {
                continue;
            }
            let bounds = segment.bounds();
            // PDF origin is bottom-left; flip to top-left.
            spans.push(TextSpan::new(
                content,
                bounds.left().value,
                height_pt - bounds.top().value,
                bounds.right().value,
                height_pt - bounds.bottom().value,
            ));
        }
        debug!(
            "Loaded page {}: {:.0}x{:.0} pt, {} chars, {} spans",
            index + 1,
            width_pt,
            height_pt,
            text.len(),
            spans.len()
        );

        Ok(PdfiumPage {
            index,
            width_pt,
            height_pt,
            text,
            spans,
        })
    }

    fn page_size(&self, page: &PdfiumPage) -> (f32, f32) {
        (page.width_pt, page.height_pt)
    }

    fn text(&self, _doc: &PdfiumDocument, page: &PdfiumPage) -> Result<String, AnnotateError> {
        Ok(page.text.clone())
    }

    fn text_spans(&self, _doc: &PdfiumDocument, page: &PdfiumPage) -> Result<Vec<TextSpan>, AnnotateError> {
        Ok(page.spans.clone())
    }

    fn rasterize(&self, doc: &PdfiumDocument, page: &PdfiumPage, dpi: f32) -> Result<RgbaImage, AnnotateError> {
        let raster_failed = |e: PdfiumError| AnnotateError::RasterisationFailed {
            page: page.index + 1,
            detail: format!("{:?}", e),
        };

        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&doc.bytes, doc.password.as_deref())
            .map_err(|e| load_error(&doc.path, doc.password.as_deref(), e))?;
        let pdf_page = document.pages().get(page.index as u16).map_err(raster_failed)?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi / 72.0);
        let bitmap = pdf_page.render_with_config(&render_config).map_err(raster_failed)?;
        let image = bitmap.as_image().to_rgba8();
        debug!(
            "Rendered page {} at {:.0} dpi → {}x{} px",
            page.index + 1,
            dpi,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}
