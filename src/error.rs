//! Error types for the pdf-annotate library.
//!
//! Four failure classes, each handled at a different boundary:
//!
//! * [`AnnotateError`]: a pipeline stage could not run or failed. Returned
//!   to the caller of that stage only; the pipeline stays usable and the
//!   error carries a [`StageContext`] (current page, last completed stage).
//!
//! * [`LoadError`]: a tabular source was unreadable or lacked required
//!   columns. Returned by provider `load` calls; the provider keeps whatever
//!   it had loaded before.
//!
//! * [`DrawError`]: a secondary decoration (a label, say) could not be
//!   drawn. Consumed inside renderers, which fall back to the primary shape.
//!
//! * [`AnnotationError`]: an annotation was constructed with an empty
//!   `text` or `category`.
//!
//! A lookup miss (keyword or URL absent from its table) is not an error at
//! all: it simply yields no annotation.

use crate::pipeline::Stage;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by pipeline stages and the high-level entry points.
#[derive(Debug, Error)]
pub enum AnnotateError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Document backend errors ───────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Requested page index exceeds the page count (0-based `page`).
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// The backend could not load a page or read its text.
    #[error("Text extraction failed for page {page}: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    /// The backend could not rasterise a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH (or --pdfium-lib) to the directory holding libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A stage was invoked before its prerequisite stage ran.
    #[error("{context}: {missing}")]
    Precondition {
        context: StageContext,
        missing: Prerequisite,
    },

    /// A stage started but failed; the pipeline state it touches is unchanged.
    #[error("{context} failed: {source}")]
    StageFailed {
        context: StageContext,
        #[source]
        source: Box<AnnotateError>,
    },

    /// Zoom factor was NaN, infinite, zero or negative.
    #[error("Invalid zoom factor {0}")]
    InvalidZoom(f32),

    /// The render worker has shut down and can accept no more requests.
    #[error("Render worker stopped before replying")]
    WorkerStopped,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output image.
    #[error("Failed to write output file '{path}': {detail}")]
    OutputWriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnnotateError {
    /// The stage context, if this error came out of a pipeline stage.
    pub fn context(&self) -> Option<&StageContext> {
        match self {
            AnnotateError::Precondition { context, .. }
            | AnnotateError::StageFailed { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The missing prerequisite, if this is a precondition failure.
    pub fn missing_prerequisite(&self) -> Option<Prerequisite> {
        match self {
            AnnotateError::Precondition { missing, .. } => Some(*missing),
            _ => None,
        }
    }
}

/// Where in the pipeline an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageContext {
    /// The stage that was invoked.
    pub stage: Stage,
    /// Current page index (0-based) at the time of the call, if any.
    pub page: Option<usize>,
    /// The last stage that completed successfully on this pipeline.
    pub last_completed: Option<Stage>,
}

impl fmt::Display for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {}", self.stage)?;
        if let Some(page) = self.page {
            write!(f, " (page {})", page + 1)?;
        }
        match self.last_completed {
            Some(last) => write!(f, " [last completed: {last}]"),
            None => write!(f, " [no stage completed]"),
        }
    }
}

/// The state a stage needs before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    DocumentOpen,
    PageLoaded,
    TextExtracted,
    AnnotationsFound,
    BaseImageRendered,
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Prerequisite::DocumentOpen => "document not open",
            Prerequisite::PageLoaded => "page not loaded",
            Prerequisite::TextExtracted => "text not extracted",
            Prerequisite::AnnotationsFound => "annotations not found",
            Prerequisite::BaseImageRendered => "base image not rendered",
        };
        f.write_str(s)
    }
}

/// A tabular source could not be loaded into a provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The source could not be opened or read.
    #[error("cannot read '{source_name}': {detail}")]
    Unreadable { source_name: String, detail: String },

    /// The source was readable but is not well-formed tabular data.
    #[error("malformed table '{source_name}': {detail}")]
    Malformed { source_name: String, detail: String },

    /// One or more required columns are absent from the header row.
    #[error("'{source_name}' is missing required columns: {}", missing.join(", "))]
    MissingColumns {
        source_name: String,
        missing: Vec<String>,
    },
}

/// An annotation violated its construction invariant.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("annotation text must not be empty")]
    EmptyText,
    #[error("annotation category must not be empty")]
    EmptyCategory,
}

/// A drawing operation on a surface could not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DrawError {
    /// Text was requested but the surface has no font.
    #[error("no font available for text rendering")]
    NoFont,
    /// The shape lies entirely outside the drawable area.
    #[error("shape at ({x}, {y}) lies outside the {width}x{height} surface")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_display_names_missing_step() {
        let e = AnnotateError::Precondition {
            context: StageContext {
                stage: Stage::FindAnnotations,
                page: Some(2),
                last_completed: Some(Stage::LoadPage),
            },
            missing: Prerequisite::TextExtracted,
        };
        let msg = e.to_string();
        assert!(msg.contains("find_annotations"), "got: {msg}");
        assert!(msg.contains("text not extracted"), "got: {msg}");
        assert!(msg.contains("page 3"), "got: {msg}");
        assert!(msg.contains("load_page"), "got: {msg}");
        assert_eq!(e.missing_prerequisite(), Some(Prerequisite::TextExtracted));
    }

    #[test]
    fn stage_failed_keeps_source() {
        let e = AnnotateError::StageFailed {
            context: StageContext {
                stage: Stage::RenderPlain,
                page: Some(0),
                last_completed: None,
            },
            source: Box::new(AnnotateError::RasterisationFailed {
                page: 1,
                detail: "out of memory".into(),
            }),
        };
        assert!(e.to_string().contains("out of memory"));
        assert!(std::error::Error::source(&e).is_some());
        assert_eq!(e.context().map(|c| c.stage), Some(Stage::RenderPlain));
    }

    #[test]
    fn missing_columns_display() {
        let e = LoadError::MissingColumns {
            source_name: "keywords.csv".into(),
            missing: vec!["color".into(), "category".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("keywords.csv"));
        assert!(msg.contains("color, category"));
    }

    #[test]
    fn page_out_of_range_display() {
        let e = AnnotateError::PageOutOfRange { page: 9, total: 3 };
        assert!(e.to_string().contains("3 pages"));
    }
}
