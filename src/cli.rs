//! CLI parsing and orchestration. Resolves the serial, builds the chapter source and the
//! book, then either prints the planned chapters (--dry-run) or writes the EPUB.
//! Maps errors to exit codes.

use crate::config::{self, Config};
use crate::epub::{Book, BookLayout, ChapterKind, ChapterSource, EPub, EpubError, MetaProperty, Person};
use crate::scraper::{
    find_serial, resolve_site, ContentMode, ExtractionRules, KnownSerial, PoliteClient,
    ScraperError, Site, WebChapterSource, DEFAULT_FALLBACK_USER_AGENT,
};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("{0}")]
    Epub(#[from] EpubError),

    #[error("Failed to write dry-run output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Scraper(_) | CliRunError::Epub(EpubError::Source { .. }) => 2,
            CliRunError::Epub(_) | CliRunError::Json(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "wepub")]
#[command(about = "Scrape a web serial chapter by chapter and write an EPUB 3")]
#[command(
    after_help = "Known serials: hpmor, pact, twig, ward. Config file keys (output_dir, user_agent, fallback_user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs, language, keep_staging_on_failure) are read from ./wepub.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// First chapter URL, or the name of a known serial (hpmor, pact, twig, ward).
    pub target: String,

    /// Directory for the staging tree and the .epub. Default: config output_dir, else ".".
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Book title. Default: the known serial's title, else "Untitled".
    #[arg(long)]
    pub title: Option<String>,

    /// Author (dc:creator with role aut). Replaces a known serial's author.
    #[arg(long)]
    pub author: Option<String>,

    /// Sort form of the author, e.g. "McCrae, J.C.".
    #[arg(long, requires = "author")]
    pub author_file_as: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Language tag (overrides config; default en).
    #[arg(long)]
    pub language: Option<String>,

    /// Unique identifier (default: a random urn:uuid).
    #[arg(long)]
    pub identifier: Option<String>,

    /// Override site detection (hpmor or wildbow).
    #[arg(long, value_parser = parse_site)]
    pub site: Option<Site>,

    /// CSS selector of the chapter title element.
    #[arg(long)]
    pub title_selector: Option<String>,

    /// CSS selector of the chapter content container.
    #[arg(long)]
    pub content_selector: Option<String>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 2).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Remove the staging directory if generation fails.
    #[arg(long)]
    pub clean_on_failure: bool,

    /// Fetch every chapter and print the planned chapter list as JSON without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress output (warnings and errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and the full error chain.
    #[arg(long, conflicts_with = "quiet")]
    pub verbose: bool,
}

fn parse_site(s: &str) -> Result<Site, String> {
    match s.to_lowercase().as_str() {
        "hpmor" => Ok(Site::Hpmor),
        "wildbow" | "wordpress" => Ok(Site::Wildbow),
        _ => Err(format!(
            "Invalid --site value: '{}'. Use 'hpmor' or 'wildbow'.",
            s
        )),
    }
}

/// Log filter used when RUST_LOG is not set.
pub fn default_log_filter(args: &Args) -> &'static str {
    if args.verbose {
        "wepub=debug"
    } else if args.quiet {
        "warn"
    } else {
        "wepub=info"
    }
}

/// Install the tracing subscriber. RUST_LOG takes precedence over the flags.
pub fn init_logging(args: &Args) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_log_filter(args)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Where chapters come from: a start URL and the rules to read each page.
#[derive(Debug)]
struct Target {
    start_url: String,
    rules: ExtractionRules,
    serial: Option<&'static KnownSerial>,
}

fn resolve_target(args: &Args) -> Result<Target, CliRunError> {
    let serial = find_serial(&args.target);
    let start_url = serial
        .map(|s| s.start_url.to_string())
        .unwrap_or_else(|| args.target.clone());
    let site_override = args.site.or(serial.map(|s| s.site));
    let custom = args.title_selector.is_some() && args.content_selector.is_some();

    let rules = match resolve_site(&start_url, site_override) {
        Ok(site) => ExtractionRules::for_site(site)?,
        Err(ScraperError::UnrecognizedHost { .. }) if custom => ExtractionRules::new(
            args.title_selector.as_deref().unwrap_or_default(),
            args.content_selector.as_deref().unwrap_or_default(),
            ContentMode::AllChildren,
        )?,
        Err(ScraperError::InvalidUrl { input, reason }) => {
            return Err(CliRunError::InvalidInput(format!(
                "Expected a chapter URL or one of: hpmor, pact, twig, ward. Invalid: {}: {}",
                input, reason
            )))
        }
        Err(ScraperError::UnrecognizedHost { host }) => {
            return Err(CliRunError::InvalidInput(format!(
                "Unsupported site: {}. Use --site hpmor or wildbow, or give both --title-selector and --content-selector.",
                host
            )))
        }
        Err(e) => return Err(e.into()),
    };
    let rules = match &args.title_selector {
        Some(sel) => rules.with_title_selector(sel)?,
        None => rules,
    };
    let rules = match &args.content_selector {
        Some(sel) => rules.with_content_selector(sel)?,
        None => rules,
    };
    Ok(Target {
        start_url,
        rules,
        serial,
    })
}

fn build_client(args: &Args, config: Option<&Config>) -> Result<PoliteClient, CliRunError> {
    let mut builder = PoliteClient::builder();
    if let Some(delay) = args.delay.or_else(|| config.and_then(|c| c.request_delay_secs)) {
        builder = builder.delay_secs(delay);
    }
    if let Some(timeout) = args.timeout.or_else(|| config.and_then(|c| c.timeout_secs)) {
        builder = builder.timeout_secs(timeout);
    }
    if let Some(n) = config.and_then(|c| c.retry_count) {
        builder = builder.retry_count(n);
    }
    if let Some(backoff) = config.and_then(|c| c.retry_backoff_secs.clone()) {
        builder = builder.retry_backoff_secs(backoff);
    }
    if let Some(ua) = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()))
    {
        builder = builder.user_agent(ua);
    }
    let fallback = config
        .and_then(|c| c.fallback_user_agent.clone())
        .unwrap_or_else(|| DEFAULT_FALLBACK_USER_AGENT.to_string());
    builder
        .fallback_user_agent(Some(fallback))
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

/// Title, author, description, language and identifier: flags over serial preset over defaults.
fn apply_metadata<S: ChapterSource>(
    book: &mut Book<S>,
    args: &Args,
    serial: Option<&KnownSerial>,
    config: Option<&Config>,
) {
    if let Some(serial) = serial {
        serial.apply(book.metadata_mut());
    }
    if let Some(title) = &args.title {
        book.set_title(title.as_str());
    }
    let metadata = book.metadata_mut();
    if let Some(author) = &args.author {
        let mut property = MetaProperty::new(author.as_str());
        if let Some(file_as) = &args.author_file_as {
            property = property.with_file_as(file_as.as_str());
        }
        metadata.creators = vec![Person::new(property).with_role("aut", Some("marc:relators"))];
    }
    if let Some(description) = &args.description {
        metadata.descriptions = vec![MetaProperty::new(description.as_str())];
    }
    if let Some(language) = args
        .language
        .clone()
        .or_else(|| config.and_then(|c| c.language.clone()))
    {
        metadata.set_language(language);
    }
    if let Some(identifier) = &args.identifier {
        metadata.set_identifier(identifier.as_str());
    }
}

/// One line of --dry-run output.
#[derive(Debug, Serialize)]
struct PlannedChapter {
    number: usize,
    title: String,
    path: String,
    kind: ChapterKind,
}

fn new_spinner() -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new_spinner();
    bar.set_style(
        indicatif::ProgressStyle::default_spinner()
            .template("{spinner} {msg} ({elapsed})")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
    );
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let target = resolve_target(args)?;
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let client = build_client(args, config.as_ref())?;

    let spinner = (!args.quiet).then(new_spinner);
    let mut source = WebChapterSource::new(client, target.rules, &target.start_url)?;
    if let Some(bar) = &spinner {
        bar.set_message("Fetching chapter 1");
        let bar = bar.clone();
        source = source.on_chapter(move |n, title| {
            bar.set_message(format!("Fetched chapter {}: {}", n, title));
        });
    }

    let mut book = Book::new(crate::epub::meta::DEFAULT_TITLE, source);
    apply_metadata(&mut book, args, target.serial, config.as_ref());

    let finish = |spinner: &Option<indicatif::ProgressBar>| {
        if let Some(bar) = spinner {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    };

    if args.dry_run {
        let title = book.metadata().title()?;
        book.chapters().set_title(title);
        let chapters = book.chapters().materialize_all();
        finish(&spinner);
        let layout = BookLayout::for_index(0);
        let planned: Vec<PlannedChapter> = chapters?
            .iter()
            .map(|c| PlannedChapter {
                number: c.number,
                title: c.title.clone(),
                path: c.path(&layout.text_dir),
                kind: c.kind,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&planned)?);
        return Ok(());
    }

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));
    let keep_staging = config
        .as_ref()
        .and_then(|c| c.keep_staging_on_failure)
        .unwrap_or(true);

    let mut epub = EPub::new(output_dir).with_book(book);
    epub.set_clean_on_failure(args.clean_on_failure || !keep_staging);
    let result = epub.generate();
    finish(&spinner);
    let path = result?;

    if !args.quiet {
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}
