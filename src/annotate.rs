//! High-level entry points.
//!
//! These wire the pieces together the common way: a registry with the
//! keyword and URL kinds, a pipeline over a backend, and a worker that
//! renders the selected pages.

use crate::annotation::{AnnotationKind, AnnotationSummary};
use crate::backend::DocumentBackend;
use crate::config::{AnnotatorConfig, PageSelection};
use crate::error::{AnnotateError, LoadError};
use crate::pipeline::{DocumentInfo, Pipeline, RenderWorker, RenderedPage};
use crate::progress::ProgressCallback;
use crate::provider::{AnnotationProvider, KeywordProvider, UrlProvider};
use crate::registry::AnnotationRegistry;
use crate::render::{KeywordRenderer, UrlRenderer};
use crate::source::TabularSource;
use crate::stream::render_pages;
use futures::StreamExt;
use image::ImageFormat;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Registry with keyword and URL providers and renderers registered.
///
/// Providers take their palettes from `config`; the keyword renderer uses
/// `config.highlight_alpha`. A source left as `None` leaves its provider
/// empty.
pub fn build_registry(
    config: &AnnotatorConfig,
    keywords: Option<&dyn TabularSource>,
    urls: Option<&dyn TabularSource>,
) -> Result<AnnotationRegistry, LoadError> {
    let mut keyword_provider = KeywordProvider::with_palette(config.keyword_colors.clone());
    if let Some(source) = keywords {
        keyword_provider.load(source)?;
    }
    let mut url_provider = UrlProvider::with_palette(config.status_colors.clone());
    if let Some(source) = urls {
        url_provider.load(source)?;
    }

    let registry = AnnotationRegistry::from_config(config);
    registry.register_provider(AnnotationKind::Keyword, Box::new(keyword_provider));
    registry.register_provider(AnnotationKind::UrlValidation, Box::new(url_provider));
    registry.register_renderer(
        AnnotationKind::Keyword,
        Box::new(KeywordRenderer::new(config.highlight_alpha)),
    );
    registry.register_renderer(AnnotationKind::UrlValidation, Box::new(UrlRenderer::new()));
    Ok(registry)
}

/// Per-page result of a batch run, without the image.
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    /// 1-indexed page number.
    pub page: usize,
    pub zoom: Option<f32>,
    pub annotations: AnnotationSummary,
    pub output: Option<PathBuf>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl PageReport {
    fn rendered(page: &RenderedPage, output: Option<PathBuf>) -> Self {
        Self {
            page: page.page_index + 1,
            zoom: Some(page.zoom),
            annotations: page.summary.clone(),
            output,
            duration_ms: page.duration.as_millis() as u64,
            error: None,
        }
    }

    fn failed(page_index: usize, error: &AnnotateError) -> Self {
        Self {
            page: page_index + 1,
            zoom: None,
            annotations: AnnotationSummary::default(),
            output: None,
            duration_ms: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Outcome of a batch run over one document.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub path: PathBuf,
    pub page_count: usize,
    pub pages: Vec<PageReport>,
    pub total_annotations: usize,
    pub failed_pages: usize,
    pub duration_ms: u64,
}

impl BatchReport {
    fn new(path: &Path, page_count: usize, pages: Vec<PageReport>, started: Instant) -> Self {
        Self {
            path: path.to_path_buf(),
            page_count,
            total_annotations: pages.iter().map(|p| p.annotations.total).sum(),
            failed_pages: pages.iter().filter(|p| p.error.is_some()).count(),
            pages,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Open `path` through a fresh worker and resolve the page selection.
async fn start<B>(
    pipeline: Arc<Pipeline<B>>,
    path: &Path,
    selection: &PageSelection,
) -> Result<(Arc<RenderWorker>, usize, Vec<usize>), AnnotateError>
where
    B: DocumentBackend + 'static,
{
    let worker = Arc::new(RenderWorker::spawn(pipeline, 4));
    let page_count = worker.open(path).await?;
    let indices = selection.to_indices(page_count);
    if indices.is_empty() {
        return Err(AnnotateError::PageOutOfRange {
            page: 0,
            total: page_count,
        });
    }
    debug!("Selected {} of {} pages", indices.len(), page_count);
    Ok((worker, page_count, indices))
}

/// Compose the selected pages of `path` in memory.
///
/// Page failures are reported per page; only a failure to open the
/// document (or an empty selection) is an error.
pub async fn annotate_document<B>(
    pipeline: Arc<Pipeline<B>>,
    path: impl AsRef<Path>,
    selection: &PageSelection,
    zoom: f32,
    progress: ProgressCallback,
) -> Result<(BatchReport, Vec<RenderedPage>), AnnotateError>
where
    B: DocumentBackend + 'static,
{
    let started = Instant::now();
    let path = path.as_ref();
    info!("Annotating {}", path.display());
    let (worker, page_count, indices) = start(pipeline, path, selection).await?;

    let mut reports = Vec::with_capacity(indices.len());
    let mut pages = Vec::with_capacity(indices.len());
    let mut stream = render_pages(worker, indices, zoom, progress);
    while let Some(outcome) = stream.next().await {
        match outcome.result {
            Ok(page) => {
                reports.push(PageReport::rendered(&page, None));
                pages.push(page);
            }
            Err(e) => reports.push(PageReport::failed(outcome.page_index, &e)),
        }
    }

    Ok((BatchReport::new(path, page_count, reports, started), pages))
}

/// Compose the selected pages of `path` and write one PNG per page into
/// `out_dir` as `<stem>-page-NNNN.png`.
///
/// Each file is written to a temporary name and renamed into place, so a
/// reader never sees a partial image.
pub async fn annotate_to_dir<B>(
    pipeline: Arc<Pipeline<B>>,
    path: impl AsRef<Path>,
    selection: &PageSelection,
    zoom: f32,
    out_dir: impl AsRef<Path>,
    progress: ProgressCallback,
) -> Result<BatchReport, AnnotateError>
where
    B: DocumentBackend + 'static,
{
    let started = Instant::now();
    let path = path.as_ref();
    let out_dir = out_dir.as_ref().to_path_buf();
    tokio::fs::create_dir_all(&out_dir)
        .await
        .map_err(|e| AnnotateError::OutputWriteFailed {
            path: out_dir.clone(),
            detail: e.to_string(),
        })?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    info!("Annotating {} → {}", path.display(), out_dir.display());
    let (worker, page_count, indices) = start(pipeline, path, selection).await?;

    let mut reports = Vec::with_capacity(indices.len());
    let mut stream = render_pages(worker, indices, zoom, progress);
    while let Some(outcome) = stream.next().await {
        let page = match outcome.result {
            Ok(page) => page,
            Err(e) => {
                reports.push(PageReport::failed(outcome.page_index, &e));
                continue;
            }
        };
        let target = out_dir.join(format!("{}-page-{:04}.png", stem, page.page_index + 1));
        match write_png(page.image.clone(), target.clone()).await {
            Ok(()) => {
                debug!("Wrote {}", target.display());
                reports.push(PageReport::rendered(&page, Some(target)));
            }
            Err(e) => {
                warn!("{}", e);
                reports.push(PageReport::failed(page.page_index, &e));
            }
        }
    }

    let report = BatchReport::new(path, page_count, reports, started);
    info!(
        "Wrote {} pages ({} failed, {} annotations)",
        report.pages.len() - report.failed_pages,
        report.failed_pages,
        report.total_annotations
    );
    Ok(report)
}

async fn write_png(image: image::RgbaImage, target: PathBuf) -> Result<(), AnnotateError> {
    tokio::task::spawn_blocking(move || {
        let tmp = target.with_extension("png.tmp");
        let write_failed = |detail: String| AnnotateError::OutputWriteFailed {
            path: target.clone(),
            detail,
        };
        image
            .save_with_format(&tmp, ImageFormat::Png)
            .map_err(|e| write_failed(e.to_string()))?;
        std::fs::rename(&tmp, &target).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            write_failed(e.to_string())
        })
    })
    .await
    .map_err(|e| AnnotateError::Internal(format!("Write task panicked: {}", e)))?
}

/// Open `path` and read document metadata plus every page's summary,
/// without rendering anything.
pub async fn inspect<B>(pipeline: Arc<Pipeline<B>>, path: impl AsRef<Path>) -> Result<DocumentInfo, AnnotateError>
where
    B: DocumentBackend + 'static,
{
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || {
        pipeline.open_document(&path)?;
        pipeline.get_info()
    })
    .await
    .map_err(|e| AnnotateError::Internal(format!("Inspect task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CsvSource;

    #[test]
    fn build_registry_registers_both_kinds() {
        let config = AnnotatorConfig::default();
        let keywords = CsvSource::inline("k.csv", "keyword,category,color\nflood,Hazard,\n");
        let registry = build_registry(&config, Some(&keywords), None).unwrap();
        assert!(registry.has_provider(AnnotationKind::Keyword));
        assert!(registry.has_renderer(AnnotationKind::UrlValidation));
        let found = registry.find_all("Flood");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].color(), config.keyword_colors.color_for("Hazard"));
    }

    #[test]
    fn build_registry_propagates_load_errors() {
        let urls = CsvSource::inline("u.csv", "url,status\nhttps://a.org,PASS\n");
        let err = build_registry(&AnnotatorConfig::default(), None, Some(&urls)).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumns { .. }));
    }
}
