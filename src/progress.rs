//! Progress-callback trait for batch page rendering.
//!
//! Pass an [`Arc<dyn RenderProgressCallback>`] to
//! [`crate::stream::render_pages`] (or the `annotate_*` entry points) to
//! receive events as each page is composed.
//!
//! # Example
//!
//! ```rust
//! use pdf_annotate::RenderProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl RenderProgressCallback for Counter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, annotations: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {}/{}: {} annotations", page_num, total_pages, annotations);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called as a batch render progresses. Every method defaults to a no-op.
///
/// Page numbers are 1-indexed; `total_pages` is the number of pages in the
/// batch, not in the document.
pub trait RenderProgressCallback: Send + Sync {
    /// Called once before the first page is queued.
    fn on_batch_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page is handed to the worker.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page was composed.
    ///
    /// * `annotations`: number of annotations found on the page
    fn on_page_complete(&self, page_num: usize, total_pages: usize, annotations: usize) {
        let _ = (page_num, total_pages, annotations);
    }

    /// Called when a page failed.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page was attempted.
    fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Ignores every event.
pub struct NoopProgressCallback;

impl RenderProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn RenderProgressCallback>;

/// The callback to use when the caller supplied none.
pub fn noop() -> ProgressCallback {
    Arc::new(NoopProgressCallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        completes: AtomicUsize,
        errors: AtomicUsize,
        annotations: AtomicUsize,
    }

    impl RenderProgressCallback for Tracking {
        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, annotations: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.annotations.fetch_add(annotations, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = noop();
        cb.on_batch_start(2);
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 7);
        cb.on_page_error(2, 2, "rasterisation failed");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let t = Tracking::default();
        t.on_batch_start(3);
        t.on_page_complete(1, 3, 4);
        t.on_page_complete(2, 3, 1);
        t.on_page_error(3, 3, "page out of range");
        assert_eq!(t.completes.load(Ordering::SeqCst), 2);
        assert_eq!(t.annotations.load(Ordering::SeqCst), 5);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
    }
}
