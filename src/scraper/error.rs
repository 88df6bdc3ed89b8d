//! Error type for fetching and extracting chapters.

use thiserror::Error;

/// Site detection, HTTP, and extraction failures. Any of these aborts the book.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error(
        "Could not detect site from URL host '{host}'. Use --site hpmor or --site wildbow, or pass --title-selector and --content-selector."
    )]
    UnrecognizedHost { host: String },

    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body: {source}")]
    BodyRead { source: reqwest::Error },

    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Chapter page has no title at {url}.")]
    MissingTitle { url: String },

    #[error("Chapter page has no content container at {url}.")]
    MissingContent { url: String },

    #[error("Next-chapter link {href:?} on {url} cannot be resolved: {reason}")]
    InvalidLink {
        href: String,
        url: String,
        reason: String,
    },
}
