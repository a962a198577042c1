//! The annotation value type shared by providers, renderers, the registry
//! and the pipeline.
//!
//! An [`Annotation`] is immutable once built. Consumers branch on its
//! [`AnnotationKind`], never on which provider produced it.

use crate::error::AnnotationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The family an annotation belongs to. Providers and renderers are
/// registered per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AnnotationKind {
    /// A controlled-vocabulary term.
    Keyword,
    /// A URL cross-referenced against a validation record.
    UrlValidation,
    /// A cross-reference to another document.
    Reference,
    /// A flagged error in the page content.
    Error,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Keyword => "keyword",
            AnnotationKind::UrlValidation => "url_validation",
            AnnotationKind::Reference => "reference",
            AnnotationKind::Error => "error",
        }
    }

    /// Parse a kind from its snake_case name. `url` is accepted as an alias.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" => Some(AnnotationKind::Keyword),
            "url_validation" | "url" => Some(AnnotationKind::UrlValidation),
            "reference" => Some(AnnotationKind::Reference),
            "error" => Some(AnnotationKind::Error),
            _ => None,
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single discovered marker with its display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    text: String,
    kind: AnnotationKind,
    category: String,
    color: String,
    metadata: BTreeMap<String, serde_json::Value>,
    enabled: bool,
}

impl Annotation {
    /// Build an enabled annotation with no metadata.
    ///
    /// Fails when `text` or `category` is empty.
    pub fn new(
        text: impl Into<String>,
        kind: AnnotationKind,
        category: impl Into<String>,
        color: impl Into<String>,
    ) -> Result<Self, AnnotationError> {
        let text = text.into();
        let category = category.into();
        if text.is_empty() {
            return Err(AnnotationError::EmptyText);
        }
        if category.is_empty() {
            return Err(AnnotationError::EmptyCategory);
        }
        Ok(Self {
            text,
            kind,
            category,
            color: color.into(),
            metadata: BTreeMap::new(),
            enabled: true,
        })
    }

    /// Attach a metadata attribute.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Return a copy with the `enabled` flag set.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> AnnotationKind {
        self.kind
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn meta(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Counts of annotations found on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationSummary {
    pub total: usize,
    pub per_kind: BTreeMap<AnnotationKind, usize>,
}

impl AnnotationSummary {
    pub fn from_annotations(annotations: &[Annotation]) -> Self {
        let mut per_kind = BTreeMap::new();
        for a in annotations {
            *per_kind.entry(a.kind()).or_insert(0) += 1;
        }
        Self {
            total: annotations.len(),
            per_kind,
        }
    }

    pub fn count(&self, kind: AnnotationKind) -> usize {
        self.per_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn keywords(&self) -> usize {
        self.count(AnnotationKind::Keyword)
    }

    pub fn urls(&self) -> usize {
        self.count(AnnotationKind::UrlValidation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_fields() {
        assert_eq!(
            Annotation::new("", AnnotationKind::Keyword, "Hazard", "#0000FF"),
            Err(AnnotationError::EmptyText)
        );
        assert_eq!(
            Annotation::new("flood", AnnotationKind::Keyword, "", "#0000FF"),
            Err(AnnotationError::EmptyCategory)
        );
    }

    #[test]
    fn metadata_and_enabled() {
        let a = Annotation::new("https://a.org", AnnotationKind::UrlValidation, "PASS", "#00AA00")
            .unwrap()
            .with_metadata("response_code", 200)
            .with_enabled(false);
        assert_eq!(a.meta("response_code"), Some(&serde_json::json!(200)));
        assert!(!a.is_enabled());
        assert_eq!(a.kind(), AnnotationKind::UrlValidation);
    }

    #[test]
    fn summary_counts_per_kind() {
        let kw = Annotation::new("kw", AnnotationKind::Keyword, "cat", "#ff0000").unwrap();
        let url = Annotation::new("url", AnnotationKind::UrlValidation, "cat", "#00ff00").unwrap();
        let summary = AnnotationSummary::from_annotations(&[kw.clone(), url, kw]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.keywords(), 2);
        assert_eq!(summary.urls(), 1);
        assert_eq!(summary.count(AnnotationKind::Reference), 0);
    }

    #[test]
    fn kind_parse_round_trips_names() {
        assert_eq!(AnnotationKind::parse("URL"), Some(AnnotationKind::UrlValidation));
        assert_eq!(AnnotationKind::parse("keyword"), Some(AnnotationKind::Keyword));
        assert_eq!(AnnotationKind::parse("bogus"), None);
    }
}
