//! Matching providers: turn raw page text into annotations.
//!
//! A provider owns a lookup table built from a [`TabularSource`] and a set of
//! enabled categories. `matches` consults only the table, `find` also drops
//! disabled categories; neither mutates anything, so the same text always
//! yields the same ordered result for a given load and category state.
//!
//! - [`keyword`]: substring lookup of controlled-vocabulary terms
//! - [`url`]    : pattern-based URL extraction cross-referenced with
//!   validation records

pub mod keyword;
pub mod url;

pub use keyword::KeywordProvider;
pub use url::UrlProvider;

use crate::annotation::Annotation;
use crate::error::LoadError;
use crate::source::TabularSource;
use std::collections::{BTreeMap, BTreeSet};

/// Discovers annotations of one kind in raw text.
pub trait AnnotationProvider: Send {
    /// Replace the lookup table with rows from `source`.
    ///
    /// Returns the number of usable rows. On error the previous table and
    /// category state are left untouched.
    fn load(&mut self, source: &dyn TabularSource) -> Result<usize, LoadError>;

    /// Every annotation in `text` whatever its category state, in
    /// deterministic order. Empty or whitespace-only text yields nothing.
    fn matches(&self, text: &str) -> Vec<Annotation>;

    /// Annotations in `text` whose category is currently enabled.
    fn find(&self, text: &str) -> Vec<Annotation> {
        self.matches(text)
            .into_iter()
            .filter(|a| self.is_category_enabled(a.category()))
            .collect()
    }

    /// Every category present in the loaded table.
    fn categories(&self) -> BTreeSet<String>;

    fn is_category_enabled(&self, category: &str) -> bool;

    /// Categories currently eligible for discovery.
    fn enabled_categories(&self) -> BTreeSet<String>;

    /// Enable or disable a category. Unknown categories are ignored.
    fn set_category_enabled(&mut self, category: &str, enabled: bool);
}

/// Known and enabled categories of one provider.
///
/// Toggling is independent of the lookup table: reloading resets every
/// category to enabled, toggling never touches the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryState {
    counts: BTreeMap<String, usize>,
    enabled: BTreeSet<String>,
}

impl CategoryState {
    /// Build from the category of every loaded row; all start enabled.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counts = BTreeMap::new();
        for label in labels {
            *counts.entry(label.to_string()).or_insert(0) += 1;
        }
        let enabled = counts.keys().cloned().collect();
        Self { counts, enabled }
    }

    pub fn all(&self) -> BTreeSet<String> {
        self.counts.keys().cloned().collect()
    }

    pub fn enabled(&self) -> BTreeSet<String> {
        self.enabled.clone()
    }

    pub fn is_enabled(&self, category: &str) -> bool {
        self.enabled.contains(category)
    }

    pub fn set_enabled(&mut self, category: &str, enabled: bool) {
        if !self.counts.contains_key(category) {
            return;
        }
        if enabled {
            self.enabled.insert(category.to_string());
        } else {
            self.enabled.remove(category);
        }
    }

    pub fn toggle(&mut self, category: &str) {
        let now = !self.is_enabled(category);
        self.set_enabled(category, now);
    }

    /// Rows loaded per category.
    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }
}
