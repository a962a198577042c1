//! Streaming batch API: emit composed pages as the worker finishes them.
//!
//! [`render_pages`] spawns a producer task that feeds page requests to a
//! [`RenderWorker`] one at a time and forwards each outcome into a bounded
//! channel. The returned stream yields outcomes in request order. Dropping
//! the stream stops the producer after the page in flight.

use crate::error::AnnotateError;
use crate::pipeline::{RenderWorker, RenderedPage};
use crate::progress::ProgressCallback;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// Pages composed ahead of the consumer.
const READ_AHEAD: usize = 2;

/// The result for one requested page.
#[derive(Debug)]
pub struct PageOutcome {
    /// 0-based page index.
    pub page_index: usize,
    pub result: Result<RenderedPage, AnnotateError>,
}

pub type PageStream = Pin<Box<dyn Stream<Item = PageOutcome> + Send>>;

/// Render `page_indices` at `zoom` through `worker`, streaming outcomes.
///
/// The worker must already have a document open. Must be called inside a
/// tokio runtime.
pub fn render_pages(
    worker: Arc<RenderWorker>,
    page_indices: Vec<usize>,
    zoom: f32,
    progress: ProgressCallback,
) -> PageStream {
    let (tx, rx) = mpsc::channel(READ_AHEAD);

    tokio::spawn(async move {
        let total = page_indices.len();
        info!("Rendering {} pages at zoom {:.2}", total, zoom);
        progress.on_batch_start(total);

        let mut succeeded = 0;
        for index in page_indices {
            let page_num = index + 1;
            progress.on_page_start(page_num, total);
            let result = worker.render(index, zoom).await;
            match &result {
                Ok(page) => {
                    succeeded += 1;
                    progress.on_page_complete(page_num, total, page.summary.total);
                }
                Err(e) => {
                    warn!("Page {} failed: {}", page_num, e);
                    progress.on_page_error(page_num, total, &e.to_string());
                }
            }
            let outcome = PageOutcome {
                page_index: index,
                result,
            };
            if tx.send(outcome).await.is_err() {
                debug!("Page stream dropped; stopping after page {}", page_num);
                break;
            }
        }

        progress.on_batch_complete(total, succeeded);
        info!("Rendered {}/{} pages", succeeded, total);
    });

    Box::pin(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryDocument, MemoryPage};
    use crate::config::AnnotatorConfig;
    use crate::pipeline::Pipeline;
    use crate::progress::noop;
    use crate::registry::AnnotationRegistry;
    use futures::StreamExt;

    #[tokio::test]
    async fn yields_outcomes_in_request_order() {
        let backend = MemoryBackend::new().with_document(
            "doc.pdf",
            MemoryDocument::new(vec![
                MemoryPage::new(72.0, 72.0),
                MemoryPage::new(72.0, 72.0).with_raster_error("broken"),
                MemoryPage::new(72.0, 72.0),
            ]),
        );
        let pipeline = Pipeline::new(
            backend,
            Arc::new(AnnotationRegistry::default()),
            AnnotatorConfig::builder().dpi(72).build().unwrap(),
        )
        .with_label_font(None);
        let worker = Arc::new(RenderWorker::spawn(Arc::new(pipeline), 2));
        worker.open("doc.pdf").await.unwrap();

        let outcomes: Vec<_> = render_pages(Arc::clone(&worker), vec![2, 1, 0], 1.0, noop())
            .collect()
            .await;
        let order: Vec<_> = outcomes.iter().map(|o| o.page_index).collect();
        assert_eq!(order, vec![2, 1, 0]);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());
        assert!(outcomes[2].result.is_ok());
    }
}
