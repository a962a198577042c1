//! The eight-stage page pipeline.
//!
//! ```text
//! open_document ─► get_info
//!       │
//!       └► load_page ─► extract_text ─► find_annotations ─┐
//!              │                                          ├► apply_annotations
//!              └──────► render_plain ─────────────────────┘
//!
//! run_all(page, zoom) = load_page → extract_text → find_annotations
//!                       → render_plain → apply_annotations
//! ```
//!
//! Each stage checks its prerequisites and fails with
//! [`AnnotateError::Precondition`] when called out of order. Any other failure
//! is wrapped in [`AnnotateError::StageFailed`] and leaves the pipeline state
//! exactly as it was before the call.
//!
//! All stages run under one mutex around the document state, so concurrent
//! callers serialise. `run_all` holds it for the whole sequence. Stages are
//! blocking; async callers use [`worker::RenderWorker`].

pub mod metadata;
pub mod worker;

pub use metadata::{DocumentInfo, PageMetadata, PageSummary, RenderedPage, StageMetric};
pub use worker::RenderWorker;

use crate::annotation::{Annotation, AnnotationSummary};
use crate::backend::DocumentBackend;
use crate::config::AnnotatorConfig;
use crate::error::{AnnotateError, Prerequisite, StageContext};
use crate::registry::AnnotationRegistry;
use crate::render::surface::load_label_font;
use crate::render::{ImageSurface, RenderBounds};
use ab_glyph::FontArc;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Stage invocations kept for [`Pipeline::stage_metrics`].
const METRIC_HISTORY: usize = 256;

/// One named step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    OpenDocument,
    GetInfo,
    LoadPage,
    ExtractText,
    FindAnnotations,
    RenderPlain,
    ApplyAnnotations,
    RunAll,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::OpenDocument,
        Stage::GetInfo,
        Stage::LoadPage,
        Stage::ExtractText,
        Stage::FindAnnotations,
        Stage::RenderPlain,
        Stage::ApplyAnnotations,
        Stage::RunAll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::OpenDocument => "open_document",
            Stage::GetInfo => "get_info",
            Stage::LoadPage => "load_page",
            Stage::ExtractText => "extract_text",
            Stage::FindAnnotations => "find_annotations",
            Stage::RenderPlain => "render_plain",
            Stage::ApplyAnnotations => "apply_annotations",
            Stage::RunAll => "run_all",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct OpenDocument<D> {
    handle: D,
    path: PathBuf,
    page_count: usize,
    /// Lazily filled; dropped with the document.
    pages: HashMap<usize, Arc<PageMetadata>>,
}

struct BaseImage {
    /// Effective zoom after clamping and the pixel cap.
    zoom: f32,
    image: RgbaImage,
}

struct PageState<P> {
    index: usize,
    page: P,
    metadata: Option<Arc<PageMetadata>>,
    annotations: Option<Arc<[Annotation]>>,
    base: Option<BaseImage>,
}

struct DocumentState<B: DocumentBackend> {
    document: Option<OpenDocument<B::Document>>,
    page: Option<PageState<B::Page>>,
    last_completed: Option<Stage>,
    metrics: VecDeque<StageMetric>,
}

impl<B: DocumentBackend> DocumentState<B> {
    fn new() -> Self {
        Self {
            document: None,
            page: None,
            last_completed: None,
            metrics: VecDeque::new(),
        }
    }

    fn context(&self, stage: Stage) -> StageContext {
        StageContext {
            stage,
            page: self.page.as_ref().map(|p| p.index),
            last_completed: self.last_completed,
        }
    }

    fn record(&mut self, metric: StageMetric) {
        if self.metrics.len() == METRIC_HISTORY {
            self.metrics.pop_front();
        }
        self.metrics.push_back(metric);
    }
}

fn missing(context: StageContext, prerequisite: Prerequisite) -> AnnotateError {
    AnnotateError::Precondition {
        context,
        missing: prerequisite,
    }
}

/// Stage orchestrator over one document at a time.
pub struct Pipeline<B: DocumentBackend> {
    backend: B,
    registry: Arc<AnnotationRegistry>,
    config: AnnotatorConfig,
    label_font: Option<FontArc>,
    state: Mutex<DocumentState<B>>,
}

impl<B: DocumentBackend> fmt::Debug for Pipeline<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("backend", &self.backend.name())
            .field("document", &self.document_path())
            .field("current_page", &self.current_page())
            .field("last_completed", &self.last_completed_stage())
            .finish()
    }
}

impl<B: DocumentBackend> Pipeline<B> {
    /// Build a pipeline. The label font comes from `config.label_font` or,
    /// failing that, a system font; without one, keyword labels are omitted.
    pub fn new(backend: B, registry: Arc<AnnotationRegistry>, config: AnnotatorConfig) -> Self {
        let label_font = load_label_font(config.label_font.as_deref());
        Self {
            backend,
            registry,
            config,
            label_font,
            state: Mutex::new(DocumentState::new()),
        }
    }

    /// Replace the label font (or drop it with `None`).
    pub fn with_label_font(mut self, font: Option<FontArc>) -> Self {
        self.label_font = font;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &Arc<AnnotationRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, DocumentState<B>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Stage plumbing ────────────────────────────────────────────────────

    fn staged<T>(
        &self,
        state: &mut DocumentState<B>,
        stage: Stage,
        body: impl FnOnce(&mut DocumentState<B>) -> Result<T, AnnotateError>,
    ) -> Result<T, AnnotateError> {
        let context = state.context(stage);
        let started = Instant::now();
        let result = body(state);
        let duration = started.elapsed();

        let page = state.page.as_ref().map(|p| p.index);
        state.record(StageMetric {
            stage,
            page,
            duration,
            succeeded: result.is_ok(),
        });

        match result {
            Ok(value) => {
                state.last_completed = Some(stage);
                debug!("Stage {} completed in {:?}", stage, duration);
                Ok(value)
            }
            Err(e @ (AnnotateError::Precondition { .. } | AnnotateError::StageFailed { .. })) => {
                warn!("Stage {} rejected: {}", stage, e);
                Err(e)
            }
            Err(e) => {
                warn!("Stage {} failed: {}", stage, e);
                Err(AnnotateError::StageFailed {
                    context,
                    source: Box::new(e),
                })
            }
        }
    }

    fn build_page_metadata(
        &self,
        doc: &B::Document,
        page: &B::Page,
        index: usize,
    ) -> Result<PageMetadata, AnnotateError> {
        let (width_pt, height_pt) = self.backend.page_size(page);
        Ok(PageMetadata {
            index,
            width_pt,
            height_pt,
            text: self.backend.text(doc, page)?,
            spans: self.backend.text_spans(doc, page)?,
        })
    }

    // ── Stage bodies (state already locked) ──────────────────────────────

    fn open_locked(&self, state: &mut DocumentState<B>, path: &Path) -> Result<usize, AnnotateError> {
        self.staged(state, Stage::OpenDocument, |state| {
            let handle = self.backend.open(path, self.config.password.as_deref())?;
            let page_count = self.backend.page_count(&handle);
            state.page = None;
            state.document = Some(OpenDocument {
                handle,
                path: path.to_path_buf(),
                page_count,
                pages: HashMap::new(),
            });
            info!(
                "Opened {} ({} pages, {} backend)",
                path.display(),
                page_count,
                self.backend.name()
            );
            Ok(page_count)
        })
    }

    fn info_locked(&self, state: &mut DocumentState<B>) -> Result<DocumentInfo, AnnotateError> {
        self.staged(state, Stage::GetInfo, |state| {
            let ctx = state.context(Stage::GetInfo);
            let doc = state
                .document
                .as_mut()
                .ok_or_else(|| missing(ctx, Prerequisite::DocumentOpen))?;

            // Computed pages are committed only once every page succeeded.
            let mut computed = Vec::new();
            let mut pages = Vec::with_capacity(doc.page_count);
            for index in 0..doc.page_count {
                if let Some(meta) = doc.pages.get(&index) {
                    pages.push(meta.summary());
                    continue;
                }
                let page = self.backend.load_page(&doc.handle, index)?;
                let meta = self.build_page_metadata(&doc.handle, &page, index)?;
                pages.push(meta.summary());
                computed.push(Arc::new(meta));
            }
            debug!("Page metadata: {} computed, {} cached", computed.len(), pages.len() - computed.len());
            for meta in computed {
                doc.pages.insert(meta.index, meta);
            }

            Ok(DocumentInfo {
                path: doc.path.clone(),
                page_count: doc.page_count,
                metadata: self.backend.metadata(&doc.handle),
                pages,
            })
        })
    }

    fn load_page_locked(&self, state: &mut DocumentState<B>, index: usize) -> Result<(), AnnotateError> {
        self.staged(state, Stage::LoadPage, |state| {
            let ctx = state.context(Stage::LoadPage);
            let doc = state
                .document
                .as_ref()
                .ok_or_else(|| missing(ctx, Prerequisite::DocumentOpen))?;
            if index >= doc.page_count {
                return Err(AnnotateError::PageOutOfRange {
                    page: index,
                    total: doc.page_count,
                });
            }
            let page = self.backend.load_page(&doc.handle, index)?;
            state.page = Some(PageState {
                index,
                page,
                metadata: None,
                annotations: None,
                base: None,
            });
            debug!("Loaded page {}", index + 1);
            Ok(())
        })
    }

    fn extract_text_locked(&self, state: &mut DocumentState<B>) -> Result<String, AnnotateError> {
        self.staged(state, Stage::ExtractText, |state| {
            let ctx = state.context(Stage::ExtractText);
            let DocumentState { document, page, .. } = state;
            let doc = document
                .as_mut()
                .ok_or_else(|| missing(ctx, Prerequisite::DocumentOpen))?;
            let current = page
                .as_mut()
                .ok_or_else(|| missing(ctx, Prerequisite::PageLoaded))?;

            let cached = doc.pages.get(&current.index).cloned();
            let meta = match cached {
                Some(meta) => meta,
                None => {
                    let meta = Arc::new(self.build_page_metadata(&doc.handle, &current.page, current.index)?);
                    doc.pages.insert(current.index, Arc::clone(&meta));
                    meta
                }
            };
            let text = meta.text.clone();
            current.metadata = Some(meta);
            Ok(text)
        })
    }

    fn find_locked(&self, state: &mut DocumentState<B>) -> Result<AnnotationSummary, AnnotateError> {
        self.staged(state, Stage::FindAnnotations, |state| {
            let ctx = state.context(Stage::FindAnnotations);
            if state.document.is_none() {
                return Err(missing(ctx, Prerequisite::DocumentOpen));
            }
            let current = state
                .page
                .as_mut()
                .ok_or_else(|| missing(ctx, Prerequisite::PageLoaded))?;
            let meta = current
                .metadata
                .as_ref()
                .ok_or_else(|| missing(ctx, Prerequisite::TextExtracted))?;

            let found = self.registry.find_all(&meta.text);
            let summary = AnnotationSummary::from_annotations(&found);
            debug!(
                "Page {}: {} annotations ({} keyword, {} url)",
                current.index + 1,
                summary.total,
                summary.keywords(),
                summary.urls()
            );
            current.annotations = Some(found);
            Ok(summary)
        })
    }

    fn render_plain_locked(&self, state: &mut DocumentState<B>, zoom: f32) -> Result<(u32, u32), AnnotateError> {
        self.staged(state, Stage::RenderPlain, |state| {
            let ctx = state.context(Stage::RenderPlain);
            let DocumentState { document, page, .. } = state;
            let doc = document
                .as_ref()
                .ok_or_else(|| missing(ctx, Prerequisite::DocumentOpen))?;
            let current = page
                .as_mut()
                .ok_or_else(|| missing(ctx, Prerequisite::PageLoaded))?;

            let requested = self.config.clamp_zoom(zoom)?;
            let (width_pt, height_pt) = self.backend.page_size(&current.page);
            let zoom = self.config.cap_zoom(requested, width_pt.max(height_pt));
            if zoom < requested {
                debug!(
                    "Page {}: zoom {:.2} reduced to {:.2} to stay within {} px",
                    current.index + 1,
                    requested,
                    zoom,
                    self.config.max_rendered_pixels
                );
            }
            let dpi = self.config.dpi as f32 * zoom;
            let image = self.backend.rasterize(&doc.handle, &current.page, dpi)?;
            let dims = image.dimensions();
            current.base = Some(BaseImage { zoom, image });
            debug!(
                "Page {} rasterised at zoom {:.2} → {}x{} px",
                current.index + 1,
                zoom,
                dims.0,
                dims.1
            );
            Ok(dims)
        })
    }

    fn apply_locked(&self, state: &mut DocumentState<B>) -> Result<RgbaImage, AnnotateError> {
        self.staged(state, Stage::ApplyAnnotations, |state| {
            let ctx = state.context(Stage::ApplyAnnotations);
            if state.document.is_none() {
                return Err(missing(ctx, Prerequisite::DocumentOpen));
            }
            let current = state
                .page
                .as_ref()
                .ok_or_else(|| missing(ctx, Prerequisite::PageLoaded))?;
            let base = current
                .base
                .as_ref()
                .ok_or_else(|| missing(ctx, Prerequisite::BaseImageRendered))?;
            let meta = current
                .metadata
                .as_ref()
                .ok_or_else(|| missing(ctx, Prerequisite::TextExtracted))?;
            if current.annotations.is_none() {
                return Err(missing(ctx, Prerequisite::AnnotationsFound));
            }

            let scale = self.config.scale(base.zoom);
            let span_texts: Vec<&str> = meta.spans.iter().map(|s| s.text.as_str()).collect();
            let per_span = self.registry.find_batch_uncached(&span_texts);

            let mut image = base.image.clone();
            let mut drawn = 0;
            {
                let mut surface = ImageSurface::new(&mut image)
                    .with_optional_font(self.label_font.as_ref(), self.config.label_font_px);
                for (span, found) in meta.spans.iter().zip(&per_span) {
                    if found.is_empty() {
                        continue;
                    }
                    let bounds = RenderBounds::from_points(span.x0, span.y0, span.x1, span.y1, scale);
                    drawn += self.registry.render(found, &mut surface, bounds);
                }
            }
            debug!("Page {}: drew {} annotations", current.index + 1, drawn);
            Ok(image)
        })
    }

    fn run_locked(&self, state: &mut DocumentState<B>, index: usize, zoom: f32) -> Result<RenderedPage, AnnotateError> {
        let started = Instant::now();
        self.staged(state, Stage::RunAll, |state| {
            if state.document.is_none() {
                return Err(missing(state.context(Stage::RunAll), Prerequisite::DocumentOpen));
            }
            self.load_page_locked(state, index)?;
            self.extract_text_locked(state)?;
            let summary = self.find_locked(state)?;
            self.render_plain_locked(state, zoom)?;
            let image = self.apply_locked(state)?;
            let zoom = state
                .page
                .as_ref()
                .and_then(|p| p.base.as_ref())
                .map_or(zoom, |b| b.zoom);
            Ok(RenderedPage {
                page_index: index,
                zoom,
                image,
                summary,
                duration: started.elapsed(),
            })
        })
    }

    // ── Public stages ─────────────────────────────────────────────────────

    /// Open (or replace) the document. Returns its page count.
    ///
    /// On failure the previously open document, if any, stays open.
    pub fn open_document(&self, path: impl AsRef<Path>) -> Result<usize, AnnotateError> {
        let mut state = self.lock();
        self.open_locked(&mut state, path.as_ref())
    }

    /// Document metadata plus a summary of every page. Computes and caches
    /// the metadata of pages not yet visited.
    pub fn get_info(&self) -> Result<DocumentInfo, AnnotateError> {
        let mut state = self.lock();
        self.info_locked(&mut state)
    }

    /// Make `index` (0-based) the current page. Clears the previous page's
    /// text, annotations and base image.
    pub fn load_page(&self, index: usize) -> Result<(), AnnotateError> {
        let mut state = self.lock();
        self.load_page_locked(&mut state, index)
    }

    /// Text of the current page.
    pub fn extract_text(&self) -> Result<String, AnnotateError> {
        let mut state = self.lock();
        self.extract_text_locked(&mut state)
    }

    /// Look up annotations in the current page's text.
    pub fn find_annotations(&self) -> Result<AnnotationSummary, AnnotateError> {
        let mut state = self.lock();
        self.find_locked(&mut state)
    }

    /// Rasterise the current page at `zoom` (clamped to the configured
    /// range, then reduced if the longest edge would exceed
    /// `max_rendered_pixels`). Returns the base image size in pixels.
    pub fn render_plain(&self, zoom: f32) -> Result<(u32, u32), AnnotateError> {
        let mut state = self.lock();
        self.render_plain_locked(&mut state, zoom)
    }

    /// Draw the current page's annotations onto a copy of the base image.
    pub fn apply_annotations(&self) -> Result<RgbaImage, AnnotateError> {
        let mut state = self.lock();
        self.apply_locked(&mut state)
    }

    /// Run every page stage for `index` at `zoom` and return the composed
    /// image.
    pub fn run_all(&self, index: usize, zoom: f32) -> Result<RgbaImage, AnnotateError> {
        self.run_page(index, zoom).map(|r| r.image)
    }

    /// [`Pipeline::run_all`] with the annotation summary and timing.
    pub fn run_page(&self, index: usize, zoom: f32) -> Result<RenderedPage, AnnotateError> {
        let mut state = self.lock();
        self.run_locked(&mut state, index, zoom)
    }

    /// Release the document and every per-document cache.
    pub fn close_document(&self) {
        let mut state = self.lock();
        if let Some(doc) = state.document.take() {
            info!("Closed {}", doc.path.display());
        }
        state.page = None;
        state.last_completed = None;
    }

    // ── Inspection ────────────────────────────────────────────────────────

    pub fn is_document_open(&self) -> bool {
        self.lock().document.is_some()
    }

    pub fn document_path(&self) -> Option<PathBuf> {
        self.lock().document.as_ref().map(|d| d.path.clone())
    }

    pub fn page_count(&self) -> Option<usize> {
        self.lock().document.as_ref().map(|d| d.page_count)
    }

    /// Current page index (0-based).
    pub fn current_page(&self) -> Option<usize> {
        self.lock().page.as_ref().map(|p| p.index)
    }

    /// Cached metadata for page `index`, if already computed.
    pub fn cached_page_metadata(&self, index: usize) -> Option<Arc<PageMetadata>> {
        self.lock()
            .document
            .as_ref()
            .and_then(|d| d.pages.get(&index).cloned())
    }

    /// Number of pages whose metadata is cached.
    pub fn cached_page_count(&self) -> usize {
        self.lock().document.as_ref().map_or(0, |d| d.pages.len())
    }

    /// Annotations found on the current page by the last `find_annotations`.
    pub fn page_annotations(&self) -> Option<Arc<[Annotation]>> {
        self.lock().page.as_ref().and_then(|p| p.annotations.clone())
    }

    /// The current page's base image, if rendered.
    pub fn base_image(&self) -> Option<RgbaImage> {
        self.lock()
            .page
            .as_ref()
            .and_then(|p| p.base.as_ref())
            .map(|b| b.image.clone())
    }

    pub fn last_completed_stage(&self) -> Option<Stage> {
        self.lock().last_completed
    }

    /// Recent stage invocations, oldest first.
    pub fn stage_metrics(&self) -> Vec<StageMetric> {
        self.lock().metrics.iter().cloned().collect()
    }
}
