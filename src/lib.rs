//! # pdf-annotate
//!
//! Find controlled-vocabulary terms and validated URLs in PDF pages and draw
//! annotation overlays on the rendered page images.
//!
//! ## Pipeline Overview
//!
//! ```text
//! keywords.csv ─► KeywordProvider ─┐
//! urls.csv     ─► UrlProvider     ─┼─► AnnotationRegistry (LRU cache, priority order)
//!                                  │            │
//! PDF ─► open_document ─► load_page ─► extract_text ─► find_annotations
//!                             │                              │
//!                             └──► render_plain ──► apply_annotations ─► PNG
//! ```
//!
//! - **Providers** turn raw text into [`Annotation`]s of one kind.
//! - **Renderers** draw annotations of one kind into a region. URL frames
//!   (priority 50) always draw beneath keyword highlights (priority 100).
//! - The **registry** maps each [`AnnotationKind`] to its provider and
//!   renderer and caches lookups by text fingerprint.
//! - The **pipeline** runs the page stages against a [`DocumentBackend`] and
//!   rejects out-of-order calls with a precondition error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_annotate::{
//!     annotate_to_dir, build_registry, progress, AnnotatorConfig, CsvSource, PageSelection,
//!     PdfiumBackend, Pipeline,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnnotatorConfig::default();
//!     let keywords = CsvSource::from_path("keywords.csv");
//!     let urls = CsvSource::from_path("url_validation.csv");
//!     let registry = build_registry(&config, Some(&keywords), Some(&urls))?;
//!
//!     let pipeline = Arc::new(Pipeline::new(PdfiumBackend::new(), Arc::new(registry), config));
//!     let report = annotate_to_dir(
//!         pipeline,
//!         "document.pdf",
//!         &PageSelection::All,
//!         1.0,
//!         "annotated/",
//!         progress::noop(),
//!     )
//!     .await?;
//!     eprintln!("{} annotations on {} pages", report.total_annotations, report.pages.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-annotate` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod annotate;
pub mod annotation;
pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod registry;
pub mod render;
pub mod source;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use annotate::{annotate_document, annotate_to_dir, build_registry, inspect, BatchReport, PageReport};
pub use annotation::{Annotation, AnnotationKind, AnnotationSummary};
pub use backend::{DocumentBackend, DocumentMetadata, MemoryBackend, PdfiumBackend, TextSpan};
pub use config::{AnnotatorConfig, AnnotatorConfigBuilder, ColorPalette, PageSelection};
pub use error::{AnnotateError, AnnotationError, DrawError, LoadError, Prerequisite, StageContext};
pub use pipeline::{DocumentInfo, PageMetadata, Pipeline, RenderWorker, RenderedPage, Stage};
pub use progress::{NoopProgressCallback, ProgressCallback, RenderProgressCallback};
pub use provider::{AnnotationProvider, KeywordProvider, UrlProvider};
pub use registry::{AnnotationRegistry, CacheStats, Fingerprint};
pub use render::{AnnotationRenderer, DrawingSurface, ImageSurface, KeywordRenderer, RenderBounds, UrlRenderer};
pub use source::{CsvSource, Table, TabularSource};
pub use stream::{render_pages, PageOutcome, PageStream};
