//! Tabular data sources consumed by providers.
//!
//! Providers only ever see a [`Table`]: a header row plus string rows. Where
//! the rows come from is behind [`TabularSource`]; [`CsvSource`] reads CSV
//! files or inline CSV text, and a [`Table`] is itself a source for callers
//! that build rows in memory.

use crate::error::LoadError;
use std::path::PathBuf;

/// Rows with named columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Convenience constructor from string slices.
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact header name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Resolve every required column, or report all that are missing.
    pub fn require(&self, source_name: &str, required: &[&str]) -> Result<Vec<usize>, LoadError> {
        let mut found = Vec::with_capacity(required.len());
        let mut missing = Vec::new();
        for name in required {
            match self.column(name) {
                Some(i) => found.push(i),
                None => missing.push(name.to_string()),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(LoadError::MissingColumns {
                source_name: source_name.to_string(),
                missing,
            })
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row { cells })
    }
}

/// A borrowed table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    cells: &'a [String],
}

impl<'a> Row<'a> {
    /// Trimmed cell at `index`; missing cells read as empty.
    pub fn get(&self, index: usize) -> &'a str {
        self.cells.get(index).map(|c| c.trim()).unwrap_or("")
    }

    /// Like [`Row::get`] for an optional column, `None` when absent or blank.
    pub fn get_opt(&self, index: Option<usize>) -> Option<&'a str> {
        index.map(|i| self.get(i)).filter(|v| !v.is_empty())
    }
}

/// Anything that can produce a [`Table`].
pub trait TabularSource {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> String;

    fn read_table(&self) -> Result<Table, LoadError>;
}

impl TabularSource for Table {
    fn name(&self) -> String {
        "<in-memory table>".to_string()
    }

    fn read_table(&self) -> Result<Table, LoadError> {
        Ok(self.clone())
    }
}

/// CSV rows from a file or from inline text. The first record is the header.
#[derive(Debug, Clone)]
pub enum CsvSource {
    Path(PathBuf),
    Inline { name: String, content: String },
}

impl CsvSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        CsvSource::Path(path.into())
    }

    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        CsvSource::Inline {
            name: name.into(),
            content: content.into(),
        }
    }

    fn parse<R: std::io::Read>(&self, mut reader: csv::Reader<R>) -> Result<Table, LoadError> {
        let headers = reader
            .headers()
            .map_err(|e| self.malformed(e))?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{FEFF}').to_string())
            .collect::<Vec<_>>();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(LoadError::Malformed {
                source_name: self.name(),
                detail: "no header row".into(),
            });
        }

        let rows = reader
            .records()
            .map(|record| {
                record
                    .map(|r| r.iter().map(str::to_string).collect::<Vec<_>>())
                    .map_err(|e| self.malformed(e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Table::new(headers, rows))
    }

    fn malformed(&self, e: csv::Error) -> LoadError {
        LoadError::Malformed {
            source_name: self.name(),
            detail: e.to_string(),
        }
    }
}

impl TabularSource for CsvSource {
    fn name(&self) -> String {
        match self {
            CsvSource::Path(p) => p.display().to_string(),
            CsvSource::Inline { name, .. } => name.clone(),
        }
    }

    fn read_table(&self) -> Result<Table, LoadError> {
        let builder = {
            let mut b = csv::ReaderBuilder::new();
            b.has_headers(true).flexible(true);
            b
        };
        match self {
            CsvSource::Path(path) => {
                let reader = builder.from_path(path).map_err(|e| LoadError::Unreadable {
                    source_name: self.name(),
                    detail: e.to_string(),
                })?;
                self.parse(reader)
            }
            CsvSource::Inline { content, .. } => self.parse(builder.from_reader(content.as_bytes())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_inline_csv_with_trimmed_headers() {
        let src = CsvSource::inline("kw", " keyword ,category,color\nflood,Hazard,#0000FF\n");
        let table = src.read_table().unwrap();
        assert_eq!(table.headers(), &["keyword", "category", "color"]);
        assert_eq!(table.len(), 1);
        let row = table.rows().next().unwrap();
        assert_eq!(row.get(0), "flood");
        assert_eq!(row.get(7), "");
    }

    #[test]
    fn require_reports_every_missing_column() {
        let table = Table::from_rows(&["keyword"], &[&["flood"]]);
        let err = table.require("kw", &["keyword", "category", "color"]).unwrap_err();
        assert_eq!(
            err,
            LoadError::MissingColumns {
                source_name: "kw".into(),
                missing: vec!["category".into(), "color".into()],
            }
        );
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = CsvSource::from_path("/definitely/not/here.csv")
            .read_table()
            .unwrap_err();
        assert!(matches!(err, LoadError::Unreadable { .. }));
    }

    #[test]
    fn reads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "url,status").unwrap();
        writeln!(f, "https://a.org,PASS").unwrap();
        let table = CsvSource::from_path(f.path()).read_table().unwrap();
        assert_eq!(table.column("status"), Some(1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn optional_cells_blank_as_none() {
        let table = Table::from_rows(&["a", "b"], &[&["x", "  "]]);
        let row = table.rows().next().unwrap();
        assert_eq!(row.get_opt(Some(0)), Some("x"));
        assert_eq!(row.get_opt(Some(1)), None);
        assert_eq!(row.get_opt(None), None);
    }
}
