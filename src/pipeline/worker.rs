//! Background page rendering.
//!
//! A [`RenderWorker`] owns a dispatcher task that receives render requests
//! over an mpsc channel, runs [`Pipeline::run_page`] on tokio's blocking
//! pool and answers each request through its own oneshot channel. Callers
//! await replies; they never share the pipeline lock with the rendering
//! thread directly.
//!
//! Requests are processed one at a time, in arrival order. The pipeline
//! would serialise them anyway.

use super::{Pipeline, RenderedPage};
use crate::backend::DocumentBackend;
use crate::error::AnnotateError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<Result<T, AnnotateError>>;

enum Request {
    Open { path: PathBuf, reply: Reply<usize> },
    Render { page: usize, zoom: f32, reply: Reply<RenderedPage> },
}

/// Handle to a running render worker.
pub struct RenderWorker {
    tx: mpsc::Sender<Request>,
    task: JoinHandle<()>,
}

impl RenderWorker {
    /// Spawn the dispatcher on the current tokio runtime.
    ///
    /// `queue_depth` bounds the number of pending requests (minimum 1).
    pub fn spawn<B>(pipeline: Arc<Pipeline<B>>, queue_depth: usize) -> Self
    where
        B: DocumentBackend + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let task = tokio::spawn(dispatch(pipeline, rx));
        Self { tx, task }
    }

    /// Open a document on the worker's pipeline.
    pub async fn open(&self, path: impl Into<PathBuf>) -> Result<usize, AnnotateError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Open {
            path: path.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| AnnotateError::WorkerStopped)?
    }

    /// Queue a render and return the receiver for its result.
    pub async fn submit(
        &self,
        page: usize,
        zoom: f32,
    ) -> Result<oneshot::Receiver<Result<RenderedPage, AnnotateError>>, AnnotateError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Render { page, zoom, reply }).await?;
        Ok(rx)
    }

    /// Render `page` (0-based) at `zoom` and wait for the result.
    pub async fn render(&self, page: usize, zoom: f32) -> Result<RenderedPage, AnnotateError> {
        let rx = self.submit(page, zoom).await?;
        rx.await.map_err(|_| AnnotateError::WorkerStopped)?
    }

    /// Stop accepting requests and wait for queued ones to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.task.await;
    }

    async fn send(&self, request: Request) -> Result<(), AnnotateError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| AnnotateError::WorkerStopped)
    }
}

async fn dispatch<B>(pipeline: Arc<Pipeline<B>>, mut rx: mpsc::Receiver<Request>)
where
    B: DocumentBackend + 'static,
{
    debug!("Render worker started");
    while let Some(request) = rx.recv().await {
        let p = Arc::clone(&pipeline);
        match request {
            Request::Open { path, reply } => {
                let result = blocking(move || p.open_document(&path)).await;
                let _ = reply.send(result);
            }
            Request::Render { page, zoom, reply } => {
                // The caller may have dropped its receiver; skip the work.
                if reply.is_closed() {
                    debug!("Render of page {} cancelled before start", page + 1);
                    continue;
                }
                let result = blocking(move || p.run_page(page, zoom)).await;
                let _ = reply.send(result);
            }
        }
    }
    info!("Render worker stopped");
}

async fn blocking<T, F>(f: F) -> Result<T, AnnotateError>
where
    F: FnOnce() -> Result<T, AnnotateError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AnnotateError::Internal(format!("Render task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryDocument, MemoryPage};
    use crate::config::AnnotatorConfig;
    use crate::registry::AnnotationRegistry;

    fn worker() -> RenderWorker {
        let backend = MemoryBackend::new().with_document(
            "doc.pdf",
            MemoryDocument::new(vec![MemoryPage::new(72.0, 72.0), MemoryPage::new(144.0, 72.0)]),
        );
        let config = AnnotatorConfig::builder().dpi(72).build().unwrap();
        let pipeline = Pipeline::new(backend, Arc::new(AnnotationRegistry::default()), config)
            .with_label_font(None);
        RenderWorker::spawn(Arc::new(pipeline), 4)
    }

    #[tokio::test]
    async fn renders_through_channel() {
        let w = worker();
        assert_eq!(w.open("doc.pdf").await.unwrap(), 2);
        let page = w.render(1, 2.0).await.unwrap();
        assert_eq!(page.page_index, 1);
        assert_eq!(page.image.dimensions(), (288, 144));
        assert_eq!(page.summary.total, 0);
        w.shutdown().await;
    }

    #[tokio::test]
    async fn failures_come_back_as_errors() {
        let w = worker();
        let err = w.render(0, 1.0).await.unwrap_err();
        assert!(err.missing_prerequisite().is_some());
        w.open("doc.pdf").await.unwrap();
        assert!(w.render(9, 1.0).await.is_err());
        // Worker is still usable after a failure.
        assert!(w.render(0, 1.0).await.is_ok());
    }
}
