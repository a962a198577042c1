//! Pipeline integration tests over the in-memory backend.
//!
//! No pdfium library is needed: `MemoryBackend` serves positioned text spans
//! and rasterises pages as blank white images.

use image::Rgba;
use pdf_annotate::{
    annotate_document, annotate_to_dir, build_registry, inspect, progress, AnnotateError,
    AnnotationKind, AnnotatorConfig, CsvSource, MemoryBackend, PageSelection, Pipeline,
    Prerequisite, RenderProgressCallback, Stage, TextSpan,
};
use pdf_annotate::backend::{MemoryDocument, MemoryPage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

fn config() -> AnnotatorConfig {
    AnnotatorConfig::builder().dpi(72).build().expect("config")
}

fn backend() -> MemoryBackend {
    MemoryBackend::new().with_document(
        "report.pdf",
        MemoryDocument::new(vec![
            MemoryPage::new(300.0, 200.0)
                .with_span(TextSpan::new("The HAZARD is near", 20.0, 20.0, 140.0, 34.0))
                .with_span(TextSpan::new("Visit https://example.com/page, now.", 20.0, 60.0, 240.0, 74.0)),
            MemoryPage::new(300.0, 200.0).with_span(TextSpan::new("nothing of note", 20.0, 20.0, 120.0, 34.0)),
            MemoryPage::new(300.0, 200.0).with_raster_error("out of memory"),
        ])
        .with_title("Flood Study"),
    )
}

fn pipeline() -> Pipeline<MemoryBackend> {
    pipeline_with(config())
}

fn pipeline_with(config: AnnotatorConfig) -> Pipeline<MemoryBackend> {
    let keywords = CsvSource::inline("keywords.csv", "keyword,category,color\nhazard,Hazard,#0000FF\n");
    let urls = CsvSource::inline(
        "urls.csv",
        "url,status,final_url,is_flagged,check_certainty\n\
         https://example.com/page,PASS,https://example.com/page,false,high\n",
    );
    let registry = build_registry(&config, Some(&keywords), Some(&urls)).expect("registry");
    Pipeline::new(backend(), Arc::new(registry), config).with_label_font(None)
}

#[derive(Default)]
struct CountingProgress {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl RenderProgressCallback for CountingProgress {
    fn on_page_start(&self, _page_num: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_complete(&self, _page_num: usize, _total: usize, _annotations: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_error(&self, _page_num: usize, _total: usize, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Stage sequencing ─────────────────────────────────────────────────────────

#[test]
fn run_all_matches_manual_stage_sequence() {
    let manual = pipeline();
    manual.open_document("report.pdf").unwrap();
    manual.load_page(0).unwrap();
    manual.extract_text().unwrap();
    let summary = manual.find_annotations().unwrap();
    manual.render_plain(1.0).unwrap();
    let expected = manual.apply_annotations().unwrap();

    let combined = pipeline();
    combined.open_document("report.pdf").unwrap();
    let page = combined.run_page(0, 1.0).unwrap();

    assert_eq!(page.summary, summary);
    assert_eq!(page.image.dimensions(), expected.dimensions());
    assert_eq!(page.image.as_raw(), expected.as_raw());
    assert_eq!(combined.last_completed_stage(), Some(Stage::RunAll));
}

#[test]
fn find_before_extract_is_a_precondition_failure() {
    let p = pipeline();
    p.open_document("report.pdf").unwrap();
    p.load_page(0).unwrap();

    let err = p.find_annotations().unwrap_err();
    assert_eq!(err.missing_prerequisite(), Some(Prerequisite::TextExtracted));
    let context = err.context().unwrap();
    assert_eq!(context.stage, Stage::FindAnnotations);
    assert_eq!(context.page, Some(0));
    assert_eq!(context.last_completed, Some(Stage::LoadPage));

    // The failed call leaves the loaded page usable.
    p.extract_text().unwrap();
    assert_eq!(p.find_annotations().unwrap().total, 2);
}

#[test]
fn loading_a_new_page_discards_derived_state() {
    let p = pipeline();
    p.open_document("report.pdf").unwrap();
    p.run_all(0, 1.0).unwrap();
    assert!(p.page_annotations().is_some());

    p.load_page(1).unwrap();
    assert_eq!(p.current_page(), Some(1));
    assert!(p.page_annotations().is_none());
    assert!(p.base_image().is_none());
    assert_eq!(
        p.apply_annotations().unwrap_err().missing_prerequisite(),
        Some(Prerequisite::BaseImageRendered)
    );
}

#[test]
fn page_out_of_range_is_a_stage_failure() {
    let p = pipeline();
    p.open_document("report.pdf").unwrap();
    let err = p.load_page(9).unwrap_err();
    match err {
        AnnotateError::StageFailed { context, source } => {
            assert_eq!(context.stage, Stage::LoadPage);
            assert!(matches!(*source, AnnotateError::PageOutOfRange { page: 9, total: 3 }));
        }
        other => panic!("expected StageFailed, got {:?}", other),
    }
    assert!(p.current_page().is_none());
}

// ── Annotation content ───────────────────────────────────────────────────────

#[test]
fn page_text_yields_keyword_and_validated_url() {
    let p = pipeline();
    p.open_document("report.pdf").unwrap();
    p.load_page(0).unwrap();
    let text = p.extract_text().unwrap();
    assert!(text.contains("HAZARD"));

    let summary = p.find_annotations().unwrap();
    assert_eq!(summary.keywords(), 1);
    assert_eq!(summary.urls(), 1);

    let found = p.page_annotations().unwrap();
    assert_eq!(found[0].kind(), AnnotationKind::UrlValidation);
    assert_eq!(found[0].text(), "https://example.com/page");
    assert_eq!(found[1].category(), "Hazard");
}

#[test]
fn overlays_land_on_matching_spans_only() {
    let p = pipeline();
    p.open_document("report.pdf").unwrap();
    let page = p.run_page(0, 1.0).unwrap();
    let base = p.base_image().unwrap();

    // dpi 72 at zoom 1: one point per pixel.
    assert_eq!(page.image.dimensions(), (300, 200));
    assert_eq!(*base.get_pixel(80, 27), WHITE);
    assert_ne!(*page.image.get_pixel(80, 27), WHITE, "keyword span not highlighted");
    assert_eq!(*page.image.get_pixel(150, 150), WHITE, "blank area was drawn on");
}

#[test]
fn disabled_category_is_not_drawn() {
    let p = pipeline();
    p.registry()
        .set_category_enabled(AnnotationKind::Keyword, "Hazard", false);
    p.open_document("report.pdf").unwrap();
    let page = p.run_page(0, 1.0).unwrap();
    assert_eq!(page.summary.keywords(), 0);
    assert_eq!(*page.image.get_pixel(80, 27), WHITE);
}

#[test]
fn zoom_scales_the_composed_image() {
    let p = pipeline();
    p.open_document("report.pdf").unwrap();
    let page = p.run_page(1, 2.0).unwrap();
    assert_eq!(page.zoom, 2.0);
    assert_eq!(page.image.dimensions(), (600, 400));
}

#[test]
fn oversized_render_is_capped_on_the_longest_edge() {
    let config = AnnotatorConfig::builder()
        .dpi(600)
        .max_rendered_pixels(1000)
        .build()
        .expect("config");
    let p = pipeline_with(config);
    p.open_document("report.pdf").unwrap();

    // Uncapped this would be 12500x8333 px.
    let page = p.run_page(0, 5.0).unwrap();
    assert_eq!(page.image.dimensions(), (1000, 667));
    assert!((page.zoom - 0.4).abs() < 1e-4, "zoom {}", page.zoom);

    // Overlays use the capped scale: the keyword span (20..140 x 20..34 pt)
    // lands near 67..467 x 67..113 px.
    assert_ne!(*page.image.get_pixel(250, 90), WHITE);
    assert_eq!(*page.image.get_pixel(800, 90), WHITE);
}

#[test]
fn span_lookups_do_not_evict_page_text() {
    let config = AnnotatorConfig::builder()
        .dpi(72)
        .cache_capacity(1)
        .build()
        .expect("config");
    let p = pipeline_with(config);
    p.open_document("report.pdf").unwrap();
    // Page 0 has two spans, more than the cache holds.
    p.run_page(0, 1.0).unwrap();

    let text = p.extract_text().unwrap();
    assert!(p.registry().is_cached(&text));
    assert_eq!(p.registry().cache_len(), 1);
    let misses = p.registry().cache_stats().misses;
    p.find_annotations().unwrap();
    assert_eq!(p.registry().cache_stats().misses, misses);
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[test]
fn concurrent_runs_serialise_and_match_sequential_output() {
    let expected: Vec<_> = (0..2)
        .map(|index| {
            let p = pipeline();
            p.open_document("report.pdf").unwrap();
            p.run_page(index, 1.0).unwrap()
        })
        .collect();

    let shared = Arc::new(pipeline());
    shared.open_document("report.pdf").unwrap();
    let handles: Vec<_> = (0..4)
        .map(|thread| {
            let p = Arc::clone(&shared);
            std::thread::spawn(move || {
                let index = thread % 2;
                (0..3)
                    .map(|_| (index, p.run_page(index, 1.0).unwrap()))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        for (index, page) in handle.join().expect("worker thread panicked") {
            assert_eq!(page.page_index, index);
            assert_eq!(page.summary, expected[index].summary);
            assert_eq!(page.image.as_raw(), expected[index].image.as_raw());
        }
    }

    let metrics = shared.stage_metrics();
    assert_eq!(metrics[0].stage, Stage::OpenDocument);
    let runs = &metrics[1..];
    assert_eq!(runs.len(), 4 * 3 * 6);
    // Each run's sub-stages are contiguous and all about the same page.
    for group in runs.chunks(6) {
        let stages: Vec<_> = group.iter().map(|m| m.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::LoadPage,
                Stage::ExtractText,
                Stage::FindAnnotations,
                Stage::RenderPlain,
                Stage::ApplyAnnotations,
                Stage::RunAll,
            ]
        );
        assert!(group.iter().all(|m| m.succeeded && m.page == group[0].page));
    }
}

// ── Batch entry points ───────────────────────────────────────────────────────

#[tokio::test]
async fn annotate_to_dir_writes_one_png_per_page() {
    let out = tempfile::tempdir().unwrap();
    let progress = Arc::new(CountingProgress::default());
    let report = annotate_to_dir(
        Arc::new(pipeline()),
        "report.pdf",
        &PageSelection::All,
        1.0,
        out.path(),
        progress.clone(),
    )
    .await
    .unwrap();

    assert_eq!(report.page_count, 3);
    assert_eq!(report.pages.len(), 3);
    assert_eq!(report.failed_pages, 1);
    assert_eq!(report.total_annotations, 2);

    let first = out.path().join("report-page-0001.png");
    let second = out.path().join("report-page-0002.png");
    assert!(first.exists());
    assert!(second.exists());
    assert!(!out.path().join("report-page-0003.png").exists());
    assert_eq!(report.pages[0].output.as_deref(), Some(first.as_path()));
    assert!(report.pages[2].error.as_deref().unwrap().contains("out of memory"));

    let decoded = image::open(&first).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (300, 200));

    assert_eq!(progress.started.load(Ordering::SeqCst), 3);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 2);
    assert_eq!(progress.failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn annotate_document_honours_page_selection() {
    let (report, pages) = annotate_document(
        Arc::new(pipeline()),
        "report.pdf",
        &PageSelection::Set(vec![2, 1, 2]),
        1.0,
        progress::noop(),
    )
    .await
    .unwrap();
    let indices: Vec<_> = pages.iter().map(|p| p.page_index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(report.pages[0].page, 1);
    assert_eq!(report.failed_pages, 0);
}

#[tokio::test]
async fn empty_selection_is_rejected() {
    let err = annotate_document(
        Arc::new(pipeline()),
        "report.pdf",
        &PageSelection::Single(12),
        1.0,
        progress::noop(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AnnotateError::PageOutOfRange { total: 3, .. }));
}

#[tokio::test]
async fn inspect_reports_metadata_and_every_page() {
    let info = inspect(Arc::new(pipeline()), "report.pdf").await.unwrap();
    assert_eq!(info.page_count, 3);
    assert_eq!(info.metadata.title.as_deref(), Some("Flood Study"));
    assert_eq!(info.pages.len(), 3);
    assert_eq!(info.pages[0].span_count, 2);
    assert_eq!(info.pages[2].span_count, 0);
}
