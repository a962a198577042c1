//! URL extraction cross-referenced with validation records.
//!
//! Four extraction patterns run in a fixed order: fully-qualified
//! `http(s)://`, bare `www.`, bare domain, and `mailto:`. Each raw hit is
//! normalised (markup tags removed, trailing punctuation stripped) and looked
//! up verbatim in the validation table. URLs with no validation record are
//! dropped.
//!
//! Hits are collapsed per distinct normalised string, never by text position:
//! `https://example.com/a` and the bare-domain hit `example.com/a` inside it
//! are separate candidates, and either one yields an annotation only if the
//! table has a record for it.

use super::{AnnotationProvider, CategoryState};
use crate::annotation::{Annotation, AnnotationKind};
use crate::config::ColorPalette;
use crate::error::LoadError;
use crate::source::TabularSource;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

const REQUIRED_COLUMNS: [&str; 5] = ["url", "status", "final_url", "is_flagged", "check_certainty"];

static URL_PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r#"(?i)https?://[^\s<>"{}|\^`\[\]]+"#).unwrap(),
        Regex::new(r#"(?i)www\.[^\s<>"{}|\^`\[\]]+"#).unwrap(),
        Regex::new(r#"(?i)[a-z0-9.-]+\.[a-z]{2,}(?:/[^\s<>"{}|\^`\[\]]*)?"#).unwrap(),
        Regex::new(r#"(?i)mailto:[^\s<>"{}|\^`\[\]]+"#).unwrap(),
    ]
});

static RE_MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

/// Normalise a raw pattern hit into a lookup key.
pub fn normalize_url(raw: &str) -> String {
    let stripped = RE_MARKUP.replace_all(raw.trim(), "");
    stripped.trim_end_matches(TRAILING_PUNCTUATION).to_string()
}

/// URL provider backed by a validation table.
#[derive(Debug, Clone)]
pub struct UrlProvider {
    /// Exact normalised URL → annotation template.
    records: HashMap<String, Annotation>,
    categories: CategoryState,
    palette: ColorPalette,
}

impl Default for UrlProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlProvider {
    pub fn new() -> Self {
        Self::with_palette(ColorPalette::status_defaults())
    }

    /// Annotation color is `palette.color_for(status)`.
    pub fn with_palette(palette: ColorPalette) -> Self {
        Self {
            records: HashMap::new(),
            categories: CategoryState::default(),
            palette,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The validation record for an exact normalised URL.
    pub fn record(&self, url: &str) -> Option<&Annotation> {
        self.records.get(url)
    }

    /// Loaded rows per status.
    pub fn category_counts(&self) -> &std::collections::BTreeMap<String, usize> {
        self.categories.counts()
    }

    /// Every distinct normalised candidate in `text`, in pattern order then
    /// match order.
    pub fn candidates(text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for pattern in URL_PATTERNS.iter() {
            for m in pattern.find_iter(text) {
                let candidate = normalize_url(m.as_str());
                if !candidate.is_empty() && seen.insert(candidate.clone()) {
                    out.push(candidate);
                }
            }
        }
        out
    }
}

fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y" | "t"
    )
}

impl AnnotationProvider for UrlProvider {
    fn load(&mut self, source: &dyn TabularSource) -> Result<usize, LoadError> {
        let name = source.name();
        debug!("Loading URL validations from: {}", name);
        let table = source.read_table()?;
        let cols = table.require(&name, &REQUIRED_COLUMNS)?;
        let (url_col, status_col, final_col, flag_col, certainty_col) =
            (cols[0], cols[1], cols[2], cols[3], cols[4]);
        let code_col = table.column("response_code");
        let error_col = table.column("error_message");

        let mut records = HashMap::new();
        for (i, row) in table.rows().enumerate() {
            let url = row.get(url_col);
            let status = row.get(status_col);
            let color = self.palette.color_for(status);

            let mut annotation =
                match Annotation::new(url, AnnotationKind::UrlValidation, status, color) {
                    Ok(a) => a
                        .with_metadata("final_url", row.get(final_col))
                        .with_metadata("is_flagged", parse_flag(row.get(flag_col)))
                        .with_metadata("check_certainty", row.get(certainty_col)),
                    Err(e) => {
                        warn!("Skipping validation row {} in {}: {}", i + 1, name, e);
                        continue;
                    }
                };

            annotation = match row.get_opt(code_col) {
                Some(code) => match code.parse::<f64>() {
                    // Spreadsheet exports write integer codes as "200.0".
                    Ok(n) if n.fract() == 0.0 => annotation.with_metadata("response_code", n as i64),
                    _ => annotation.with_metadata("response_code", code),
                },
                None => annotation.with_metadata("response_code", serde_json::Value::Null),
            };
            if let Some(err) = row.get_opt(error_col) {
                annotation = annotation.with_metadata("error_message", err);
            }

            // Later rows for the same URL replace earlier ones.
            records.insert(url.to_string(), annotation);
        }

        let rows = records.len();
        self.categories = CategoryState::from_labels(records.values().map(|a| a.category()));
        self.records = records;
        info!(
            "Loaded {} URL validation records ({} statuses) from {}",
            rows,
            self.categories.all().len(),
            name
        );
        Ok(rows)
    }

    fn matches(&self, text: &str) -> Vec<Annotation> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        Self::candidates(text)
            .iter()
            .filter_map(|candidate| self.records.get(candidate))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CsvSource, Table};

    const HEADERS: &[&str] = &["url", "status", "final_url", "is_flagged", "check_certainty"];

    fn loaded(rows: &[&[&str]]) -> UrlProvider {
        let mut p = UrlProvider::new();
        p.load(&Table::from_rows(HEADERS, rows)).unwrap();
        p
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_url() {
        let p = loaded(&[&["https://example.com/page", "PASS", "https://example.com/page", "false", "high"]]);
        let found = p.find("Visit https://example.com/page, now.");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category(), "PASS");
        assert_eq!(found[0].text(), "https://example.com/page");
        assert_eq!(found[0].color(), "#00AA00");
    }

    #[test]
    fn unvalidated_urls_are_dropped() {
        let p = loaded(&[&["https://a.org", "PASS", "", "false", "high"]]);
        assert!(p.find("see https://b.org today").is_empty());
    }

    #[test]
    fn normalize_strips_markup_and_punctuation() {
        assert_eq!(normalize_url(" https://a.org/x</b>.;"), "https://a.org/x");
        assert_eq!(normalize_url("www.a.org!?"), "www.a.org");
    }

    #[test]
    fn overlapping_hits_kept_per_distinct_string() {
        let p = loaded(&[
            &["https://example.com/a", "PASS", "", "false", "high"],
            &["example.com/a", "FAIL", "", "true", "low"],
        ]);
        let found = p.find("Go to https://example.com/a.");
        let cats: Vec<_> = found.iter().map(|a| a.category()).collect();
        assert_eq!(cats, vec!["PASS", "FAIL"]);
    }

    #[test]
    fn repeated_url_collapses_to_one_candidate() {
        let p = loaded(&[&["https://a.org", "PASS", "", "false", "high"]]);
        assert_eq!(p.find("https://a.org and again https://a.org.").len(), 1);
    }

    #[test]
    fn www_and_mailto_patterns() {
        let p = loaded(&[
            &["www.wbdg.org", "PASS", "", "false", "high"],
            &["mailto:help@wbdg.org", "EMAIL", "", "false", "high"],
        ]);
        let found = p.find("Contact mailto:help@wbdg.org or www.wbdg.org.");
        let texts: Vec<_> = found.iter().map(|a| a.text()).collect();
        assert_eq!(texts, vec!["www.wbdg.org", "mailto:help@wbdg.org"]);
    }

    #[test]
    fn status_toggle_filters() {
        let mut p = loaded(&[
            &["https://a.org", "PASS", "", "false", "high"],
            &["https://b.org", "FAIL", "", "false", "high"],
        ]);
        p.set_category_enabled("FAIL", false);
        let found = p.find("https://a.org https://b.org");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category(), "PASS");
    }

    #[test]
    fn optional_columns_become_metadata() {
        let mut p = UrlProvider::new();
        let src = CsvSource::inline(
            "urls.csv",
            "url,status,response_code,final_url,error_message,is_flagged,check_certainty\n\
             https://a.org,FAIL,404.0,https://a.org/,Not Found,True,high\n",
        );
        assert_eq!(p.load(&src).unwrap(), 1);
        let rec = p.record("https://a.org").unwrap();
        assert_eq!(rec.meta("response_code"), Some(&serde_json::json!(404)));
        assert_eq!(rec.meta("error_message"), Some(&serde_json::json!("Not Found")));
        assert_eq!(rec.meta("is_flagged"), Some(&serde_json::json!(true)));
        assert_eq!(p.category_counts().get("FAIL"), Some(&1));
    }

    #[test]
    fn missing_required_column_is_load_failure() {
        let mut p = loaded(&[&["https://a.org", "PASS", "", "false", "high"]]);
        let bad = CsvSource::inline("urls.csv", "url,status\nhttps://b.org,PASS\n");
        assert!(p.load(&bad).is_err());
        assert_eq!(p.len(), 1);
        assert_eq!(p.find("https://a.org").len(), 1);
    }
}
