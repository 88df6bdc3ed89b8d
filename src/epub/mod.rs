//! EPUB document model and writer.
//!
//! Package document (metadata, manifest, spine), navigation documents (NCX and XHTML
//! nav), chapter documents, and the assembler that stages them on disk and zips the
//! result. Chapters are pulled lazily from a [ChapterSource].

pub mod archive;
pub mod chapter;
pub mod container;
pub mod manifest;
pub mod meta;
pub mod navigation;
pub mod package;
pub mod slug;

pub use archive::{AssemblyState, Book, BookLayout, EPub};
pub use chapter::{
    Chapter, ChapterKind, ChapterSequence, ChapterSource, SourceError, SourcedChapter,
};
pub use container::Container;
pub use manifest::{Direction, Item, ItemProperties, ItemRef, Manifest, RenditionHints, Spine};
pub use meta::{Collection, Identifier, MetaData, MetaProperty, Person, PropertyValue, Title};
pub use navigation::TableOfContents;
pub use package::PackageDocument;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Mimetype string, written verbatim as the first, uncompressed archive entry.
pub const MIMETYPE: &str = "application/epub+zip";
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";
pub const CSS_MEDIA_TYPE: &str = "text/css";
pub const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Errors from building or writing an EPUB.
///
/// Maps to CLI exit code 3, except [EpubError::Source] which is a chapter source
/// failure (exit code 2).
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Duplicate id '{id}' in package document.")]
    DuplicateId { id: String },

    #[error("Duplicate manifest href '{href}'.")]
    DuplicateHref { href: String },

    #[error("Two books in the archive write the same file: {path}")]
    DuplicatePath { path: String },

    #[error("Cannot write package document: no {kind} in metadata.")]
    MissingMetadata { kind: &'static str },

    #[error("Chapter {index} requested but the sequence ended after {available} chapters.")]
    ChapterOutOfRange { index: usize, available: usize },

    #[error("Could not obtain chapter {number}: {source}")]
    Source {
        number: usize,
        #[source]
        source: SourceError,
    },

    #[error("EPUB has no books to write.")]
    NoBooks,

    #[error("Cannot write EPUB: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read staging directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

/// Attach `path` to an I/O error.
pub(crate) fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> EpubError + '_ {
    move |source| EpubError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write a serialized document, creating parent directories as needed.
pub(crate) fn write_document(doc: &crate::xml::Document, path: &Path) -> Result<(), EpubError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    doc.write(path).map_err(io_err(path))?;
    tracing::debug!(path = %path.display(), "wrote document");
    Ok(())
}
