//! Per-page and per-document records produced by the pipeline.

use super::Stage;
use crate::annotation::AnnotationSummary;
use crate::backend::{DocumentMetadata, TextSpan};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Text and geometry of one page, computed once per open document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// 0-based page index.
    pub index: usize,
    pub width_pt: f32,
    pub height_pt: f32,
    pub text: String,
    pub spans: Vec<TextSpan>,
}

impl PageMetadata {
    pub fn summary(&self) -> PageSummary {
        PageSummary {
            index: self.index,
            width_pt: self.width_pt,
            height_pt: self.height_pt,
            char_count: self.text.chars().count(),
            span_count: self.spans.len(),
        }
    }
}

/// Size and text volume of one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub index: usize,
    pub width_pt: f32,
    pub height_pt: f32,
    pub char_count: usize,
    pub span_count: usize,
}

/// What `get_info` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
    pub pages: Vec<PageSummary>,
}

/// One stage invocation, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageMetric {
    pub stage: Stage,
    pub page: Option<usize>,
    pub duration: Duration,
    pub succeeded: bool,
}

/// A fully composed page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 0-based page index.
    pub page_index: usize,
    /// Zoom actually used, after clamping and the pixel cap.
    pub zoom: f32,
    pub image: RgbaImage,
    pub summary: AnnotationSummary,
    pub duration: Duration,
}
