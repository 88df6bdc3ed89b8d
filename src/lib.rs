//! wepub: CLI scraper for sequential web serials, assembling the chapters into an EPUB 3 book.

pub mod cli;
pub mod config;
pub mod epub;
pub mod scraper;
pub mod xml;

// Re-exports for CLI and consumers.
pub use crate::epub::{
    Book, Chapter, ChapterSource, EPub, EpubError, MetaData, MetaProperty, SourceError,
    SourcedChapter,
};
pub use crate::scraper::{
    find_serial, resolve_site, ExtractionRules, PoliteClient, PoliteClientBuilder, ScraperError,
    Site, WebChapterSource,
};
