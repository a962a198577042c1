//! CLI binary for pdf-annotate.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnnotatorConfig`, builds the registry from the CSV tables and writes one
//! annotated PNG per page.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_annotate::{
    annotate_to_dir, build_registry, inspect, AnnotationKind, AnnotatorConfig, CsvSource,
    PageSelection, PdfiumBackend, Pipeline, ProgressCallback, RenderProgressCallback,
    TabularSource,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_ms(&self, page_num: usize) -> u128 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&page_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl RenderProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Annotating");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Annotating {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, annotations: usize) {
        let elapsed_ms = self.elapsed_ms(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<16}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{annotations:>4} annotations")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed_ms = self.elapsed_ms(page_num);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} pages annotated",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages annotated  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Annotate every page with keywords and URL validations
  pdf-annotate report.pdf --keywords keywords.csv --urls url_validation.csv

  # Pages 3-8 at double zoom into a custom directory
  pdf-annotate report.pdf -k keywords.csv --pages 3-8 --zoom 2 -o out/

  # Hide one keyword category and one URL status
  pdf-annotate report.pdf -k keywords.csv -u urls.csv \
      --disable keyword:Domain --disable url:PASS

  # Inspect PDF metadata and per-page text volume
  pdf-annotate --inspect-only report.pdf

TABLE FORMATS:
  keywords.csv   keyword,category,color          (color may be blank)
  urls.csv       url,status,final_url,is_flagged,check_certainty
                 [,response_code,error_message]

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Directory holding libpdfium (otherwise ./ then system)
  RUST_LOG          Overrides the log filter (e.g. pdf_annotate=debug)
"#;

/// Overlay keyword highlights and URL validation status on PDF pages.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-annotate",
    version,
    about = "Overlay keyword highlights and URL validation status on PDF pages",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path. Not needed with --list-categories.
    #[arg(required_unless_present = "list_categories")]
    input: Option<PathBuf>,

    /// Keyword table (CSV with keyword, category, color).
    #[arg(short, long, env = "PDF_ANNOTATE_KEYWORDS")]
    keywords: Option<PathBuf>,

    /// URL validation table (CSV with url, status, final_url, is_flagged, check_certainty).
    #[arg(short, long, env = "PDF_ANNOTATE_URLS")]
    urls: Option<PathBuf>,

    /// Directory for the annotated PNGs.
    #[arg(short, long, env = "PDF_ANNOTATE_OUTPUT", default_value = "annotated")]
    output_dir: PathBuf,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF_ANNOTATE_PAGES", default_value = "all")]
    pages: String,

    /// Zoom factor applied on top of --dpi.
    #[arg(long, env = "PDF_ANNOTATE_ZOOM", default_value_t = 1.0)]
    zoom: f32,

    /// Base rendering DPI at zoom 1.0 (72–600).
    #[arg(long, env = "PDF_ANNOTATE_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Longest edge of a rendered page in pixels; larger renders are scaled down.
    #[arg(long, env = "PDF_ANNOTATE_MAX_PIXELS", default_value_t = 4096)]
    max_pixels: u32,

    /// Hide a category, as kind:category (kinds: keyword, url). Repeatable.
    #[arg(long = "disable", value_name = "KIND:CATEGORY")]
    disabled: Vec<String>,

    /// TTF/OTF font for keyword labels.
    #[arg(long, env = "PDF_ANNOTATE_FONT")]
    font: Option<PathBuf>,

    /// Keyword highlight opacity (0–255).
    #[arg(long, default_value_t = 80)]
    alpha: u8,

    /// Annotation cache capacity.
    #[arg(long, default_value_t = 256)]
    cache_capacity: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF_ANNOTATE_PASSWORD")]
    password: Option<String>,

    /// Directory holding the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Print the batch report as JSON.
    #[arg(long)]
    json: bool,

    /// Print PDF metadata only, no rendering.
    #[arg(long)]
    inspect_only: bool,

    /// List the categories loaded from the tables and exit.
    #[arg(long)]
    list_categories: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDF_ANNOTATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    // ── Registry ─────────────────────────────────────────────────────────
    let keywords = cli.keywords.as_ref().map(CsvSource::from_path);
    let urls = cli.urls.as_ref().map(CsvSource::from_path);
    let registry = build_registry(
        &config,
        keywords.as_ref().map(|s| s as &dyn TabularSource),
        urls.as_ref().map(|s| s as &dyn TabularSource),
    )
    .context("Failed to load annotation tables")?;

    for arg in &cli.disabled {
        let (kind, category) = parse_disable(arg)?;
        if !registry.set_category_enabled(kind, &category, false) {
            eprintln!("{} unknown {} category '{}'", cyan("⚠"), kind, category);
        }
    }

    if cli.list_categories {
        let enabled = registry.enabled_categories();
        for (kind, categories) in registry.all_categories() {
            println!("{}", bold(kind.as_str()));
            for category in categories {
                let on = enabled.get(&kind).is_some_and(|e| e.contains(&category));
                println!("  {} {}", if on { green("●") } else { dim("○") }, category);
            }
        }
        return Ok(());
    }

    let input = cli.input.as_deref().context("An input PDF is required")?;
    let pipeline = Arc::new(Pipeline::new(
        PdfiumBackend::from_config(&config),
        Arc::new(registry),
        config,
    ));

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(pipeline, input).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            let meta = &info.metadata;
            println!("File:         {}", info.path.display());
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", info.page_count);
            if let Some(ref v) = meta.pdf_version {
                println!("PDF Version:  {}", v);
            }
            for page in &info.pages {
                println!(
                    "  page {:>4}  {:>4.0}x{:<4.0} pt  {:>6} chars  {:>4} spans",
                    page.index + 1,
                    page.width_pt,
                    page.height_pt,
                    page.char_count,
                    page.span_count
                );
            }
        }
        return Ok(());
    }

    // ── Annotate ─────────────────────────────────────────────────────────
    let selection = PageSelection::parse(&cli.pages).context("Invalid --pages")?;
    let progress: ProgressCallback = if show_progress {
        CliProgressCallback::new() as Arc<dyn RenderProgressCallback>
    } else {
        pdf_annotate::progress::noop()
    };

    let report = annotate_to_dir(pipeline, input, &selection, cli.zoom, &cli.output_dir, progress)
        .await
        .context("Annotation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {}/{} pages  {} annotations  {}ms  →  {}",
            if report.failed_pages == 0 { green("✔") } else { cyan("⚠") },
            report.pages.len() - report.failed_pages,
            report.pages.len(),
            report.total_annotations,
            report.duration_ms,
            bold(&cli.output_dir.display().to_string()),
        );
    }

    if report.failed_pages == report.pages.len() {
        anyhow::bail!("every selected page failed");
    }
    Ok(())
}

/// Map CLI args to `AnnotatorConfig`.
fn build_config(cli: &Cli) -> Result<AnnotatorConfig> {
    let mut builder = AnnotatorConfig::builder()
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .cache_capacity(cli.cache_capacity)
        .highlight_alpha(cli.alpha);
    if let Some(ref font) = cli.font {
        builder = builder.label_font(font);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(dir);
    }
    builder.build().context("Invalid configuration")
}

/// Parse `--disable kind:category`.
fn parse_disable(arg: &str) -> Result<(AnnotationKind, String)> {
    let (kind, category) = arg
        .split_once(':')
        .with_context(|| format!("Expected KIND:CATEGORY, got '{}'", arg))?;
    let kind = AnnotationKind::parse(kind)
        .with_context(|| format!("Unknown annotation kind '{}' (use keyword or url)", kind))?;
    let category = category.trim();
    if category.is_empty() {
        anyhow::bail!("Empty category in '{}'", arg);
    }
    Ok((kind, category.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn list_categories_needs_no_input() {
        let cli = Cli::try_parse_from(["pdf-annotate", "--list-categories", "-k", "kw.csv"]).unwrap();
        assert!(cli.list_categories);
        assert!(cli.input.is_none());
    }

    #[test]
    fn input_is_required_otherwise() {
        let err = Cli::try_parse_from(["pdf-annotate", "-k", "kw.csv"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from(["pdf-annotate", "doc.pdf", "--max-pixels", "2000"]).unwrap();
        assert_eq!(cli.input.as_deref(), Some(Path::new("doc.pdf")));
        assert_eq!(build_config(&cli).unwrap().max_rendered_pixels, 2000);
    }

    #[test]
    fn disable_arg_parses_kind_and_category() {
        let (kind, category) = parse_disable("keyword: Hazard").unwrap();
        assert_eq!(kind, AnnotationKind::Keyword);
        assert_eq!(category, "Hazard");
        assert!(parse_disable("keyword").is_err());
        assert!(parse_disable("keyword:").is_err());
    }
}
