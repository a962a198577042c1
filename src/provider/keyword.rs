//! Controlled-vocabulary keyword matching.
//!
//! Matching is a lowercase substring test, not a token match: a short term
//! inside a longer word ("art" in "start") matches. Terms are tried in
//! table order, so results are stable for a given load order.

use super::{AnnotationProvider, CategoryState};
use crate::annotation::{Annotation, AnnotationKind};
use crate::config::ColorPalette;
use crate::error::LoadError;
use crate::source::TabularSource;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

const REQUIRED_COLUMNS: [&str; 3] = ["keyword", "category", "color"];

/// Keyword provider backed by a `{keyword, category, color}` table.
#[derive(Debug, Clone)]
pub struct KeywordProvider {
    /// Lowercased term → annotation templates, in first-seen table order.
    /// One term may appear under several categories.
    terms: Vec<(String, Vec<Annotation>)>,
    categories: CategoryState,
    palette: ColorPalette,
}

impl Default for KeywordProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordProvider {
    pub fn new() -> Self {
        Self::with_palette(ColorPalette::keyword_defaults())
    }

    /// Rows with a blank `color` take their category's color from `palette`.
    pub fn with_palette(palette: ColorPalette) -> Self {
        Self {
            terms: Vec::new(),
            categories: CategoryState::default(),
            palette,
        }
    }

    /// Number of distinct terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// All templates in `category`, in table order.
    pub fn keywords_for_category(&self, category: &str) -> Vec<&Annotation> {
        self.terms
            .iter()
            .flat_map(|(_, templates)| templates.iter())
            .filter(|a| a.category() == category)
            .collect()
    }

    /// Terms containing `needle` (case-insensitive). An empty needle lists all.
    pub fn search(&self, needle: &str) -> Vec<&str> {
        let needle = needle.to_lowercase();
        self.terms
            .iter()
            .map(|(term, _)| term.as_str())
            .filter(|term| term.contains(&needle))
            .collect()
    }

    /// Loaded rows per category.
    pub fn category_counts(&self) -> &std::collections::BTreeMap<String, usize> {
        self.categories.counts()
    }
}

impl AnnotationProvider for KeywordProvider {
    fn load(&mut self, source: &dyn TabularSource) -> Result<usize, LoadError> {
        let name = source.name();
        debug!("Loading keywords from: {}", name);
        let table = source.read_table()?;
        let cols = table.require(&name, &REQUIRED_COLUMNS)?;
        let (kw_col, cat_col, color_col) = (cols[0], cols[1], cols[2]);

        let mut terms: Vec<(String, Vec<Annotation>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut labels = Vec::new();

        for (i, row) in table.rows().enumerate() {
            let original = row.get(kw_col);
            let category = row.get(cat_col);
            let color = match row.get(color_col) {
                "" => self.palette.color_for(category),
                c => c,
            };
            let term = original.to_lowercase();

            let annotation = match Annotation::new(&term, AnnotationKind::Keyword, category, color) {
                Ok(a) => a.with_metadata("original_text", original),
                Err(e) => {
                    warn!("Skipping keyword row {} in {}: {}", i + 1, name, e);
                    continue;
                }
            };

            labels.push(annotation.category().to_string());
            match index.get(&term) {
                Some(&slot) => terms[slot].1.push(annotation),
                None => {
                    index.insert(term.clone(), terms.len());
                    terms.push((term, vec![annotation]));
                }
            }
        }

        let rows = labels.len();
        self.categories = CategoryState::from_labels(labels.iter().map(String::as_str));
        self.terms = terms;
        info!(
            "Loaded {} keyword rows ({} terms, {} categories) from {}",
            rows,
            self.terms.len(),
            self.categories.all().len(),
            name
        );
        Ok(rows)
    }

    fn matches(&self, text: &str) -> Vec<Annotation> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let haystack = text.to_lowercase();
        self.terms
            .iter()
            .filter(|(term, _)| haystack.contains(term.as_str()))
            .flat_map(|(_, templates)| templates.iter())
            .cloned()
            .collect()
    }

    fn categories(&self) -> BTreeSet<String> {
        self.categories.all()
    }

    fn is_category_enabled(&self, category: &str) -> bool {
        self.categories.is_enabled(category)
    }

    fn enabled_categories(&self) -> BTreeSet<String> {
        self.categories.enabled()
    }

    fn set_category_enabled(&mut self, category: &str, enabled: bool) {
        self.categories.set_enabled(category, enabled);
    }
}
