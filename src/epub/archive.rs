//! Book assembly: stage every document on disk, then zip the tree into an `.epub`.

use crate::epub::chapter::{ChapterSequence, ChapterSource};
use crate::epub::container::Container;
use crate::epub::meta::MetaData;
use crate::epub::navigation::TableOfContents;
use crate::epub::package::PackageDocument;
use crate::epub::slug::file_stem;
use crate::epub::{io_err, write_document, EpubError, MIMETYPE};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const META_INF_DIR: &str = "META-INF";
pub const CONTENT_DIR: &str = "CONTENT";
const MIMETYPE_FILE: &str = "mimetype";
const STAGING_SUBDIRS: [&str; 5] = [
    META_INF_DIR,
    CONTENT_DIR,
    "CONTENT/Text",
    "CONTENT/Images",
    "CONTENT/Styles",
];
const STYLESHEET_PATH: &str = "Styles/stylesheet.css";
const DEFAULT_STYLESHEET: &str = "body { margin: 0 5%; line-height: 1.4; }\n\
h1 { text-align: center; margin: 2em 0 1em; }\n\
p { margin: 0 0 0.8em; text-indent: 0; }\n";

/// Where one book's files go, relative to the content root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLayout {
    pub package_file: String,
    pub ncx_file: String,
    pub nav_file: String,
    pub text_dir: String,
}

impl BookLayout {
    /// Layout of the `index`-th book (0-based). The first book keeps the plain names.
    pub fn for_index(index: usize) -> Self {
        if index == 0 {
            Self {
                package_file: "content_0.opf".to_string(),
                ncx_file: "toc.ncx".to_string(),
                nav_file: "toc.xhtml".to_string(),
                text_dir: "Text".to_string(),
            }
        } else {
            Self {
                package_file: format!("content_{}.opf", index),
                ncx_file: format!("toc_{}.ncx", index),
                nav_file: format!("toc_{}.xhtml", index),
                text_dir: format!("Text/book_{}", index),
            }
        }
    }

    /// Stylesheet href as seen from a chapter in `text_dir`.
    pub fn stylesheet_href(&self) -> String {
        let depth = self.text_dir.split('/').filter(|s| !s.is_empty()).count();
        format!("{}{}", "../".repeat(depth), STYLESHEET_PATH)
    }
}

/// One book: its package document, navigation files and chapter sequence.
pub struct Book<S> {
    pub package: PackageDocument,
    pub toc: TableOfContents,
    chapters: ChapterSequence<S>,
}

impl<S: ChapterSource> Book<S> {
    pub fn new(title: impl Into<String>, source: S) -> Self {
        let title: String = title.into();
        let mut package = PackageDocument::new();
        package.metadata.set_title(title.as_str());
        Self {
            package,
            toc: TableOfContents::default(),
            chapters: ChapterSequence::new(title, source),
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        let title: String = title.into();
        self.package.metadata.set_title(title.as_str());
        self.chapters.set_title(title);
    }

    pub fn metadata(&self) -> &MetaData {
        &self.package.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetaData {
        &mut self.package.metadata
    }

    pub fn chapters(&mut self) -> &mut ChapterSequence<S> {
        &mut self.chapters
    }

    /// Fetch every chapter, then write chapters, stylesheet, navigation and package
    /// document under `content_dir`. Returns the content-relative paths written.
    ///
    /// Call once per book: a second call fails on duplicate manifest entries.
    pub fn write(&mut self, content_dir: &Path, layout: &BookLayout) -> Result<Vec<String>, EpubError> {
        let title = self.package.metadata.title()?;
        self.chapters.set_title(title.as_str());
        let chapters = self.chapters.materialize_all()?;
        tracing::info!(title = %title, chapters = chapters.len(), "writing book");

        let stylesheet_href = layout.stylesheet_href();
        let mut written = Vec::with_capacity(chapters.len() + 3);
        for chapter in chapters {
            let path = chapter.path(&layout.text_dir);
            self.package.register_chapter(chapter, &path)?;
            write_document(
                &chapter.document_with_stylesheet(&stylesheet_href),
                &content_dir.join(&path),
            )?;
            written.push(path);
        }

        self.package.register_stylesheet(STYLESHEET_PATH)?;
        let stylesheet = content_dir.join(STYLESHEET_PATH);
        fs::write(&stylesheet, DEFAULT_STYLESHEET).map_err(io_err(&stylesheet))?;

        self.toc = TableOfContents::new(layout.ncx_file.as_str(), layout.nav_file.as_str());
        self.package.register_table_of_contents(&self.toc)?;
        let uid = self.package.unique_identifier_value()?;
        self.toc
            .write(content_dir, &title, &uid, chapters, &layout.text_dir)?;
        written.push(layout.ncx_file.clone());
        written.push(layout.nav_file.clone());

        self.package.write(&content_dir.join(&layout.package_file))?;
        written.push(layout.package_file.clone());
        Ok(written)
    }
}

/// Progress of [EPub::generate]. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AssemblyState {
    Init,
    DirectoryCreated,
    MimetypeWritten,
    BooksProcessed,
    ContainerWritten,
    Compressed,
    Done,
}

/// The archive: container plus one or more books, staged under `output_dir`.
pub struct EPub<S> {
    pub container: Container,
    books: Vec<Book<S>>,
    output_dir: PathBuf,
    clean_on_failure: bool,
    state: AssemblyState,
}

impl<S: ChapterSource> EPub<S> {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            container: Container::new(),
            books: Vec::new(),
            output_dir: output_dir.into(),
            clean_on_failure: false,
            state: AssemblyState::Init,
        }
    }

    pub fn with_book(mut self, book: Book<S>) -> Self {
        self.books.push(book);
        self
    }

    pub fn add_book(&mut self, book: Book<S>) {
        self.books.push(book);
    }

    pub fn books(&self) -> &[Book<S>] {
        &self.books
    }

    pub fn books_mut(&mut self) -> &mut [Book<S>] {
        &mut self.books
    }

    /// Remove the staging tree when generation fails. Off by default.
    pub fn set_clean_on_failure(&mut self, clean: bool) {
        self.clean_on_failure = clean;
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File stem of the archive, from the first book's title.
    pub fn file_stem(&self) -> Result<String, EpubError> {
        let first = self.books.first().ok_or(EpubError::NoBooks)?;
        Ok(file_stem(&first.metadata().title()?))
    }

    pub fn staging_dir(&self) -> Result<PathBuf, EpubError> {
        Ok(self.output_dir.join(self.file_stem()?))
    }

    /// Run every step and return the path of the written `.epub`.
    pub fn generate(&mut self) -> Result<PathBuf, EpubError> {
        let staging = self.staging_dir()?;
        self.state = AssemblyState::Init;
        match self.run(&staging) {
            Ok(path) => Ok(path),
            Err(e) => {
                if self.clean_on_failure {
                    if let Err(cleanup) = fs::remove_dir_all(&staging) {
                        tracing::warn!(path = %staging.display(), error = %cleanup, "could not remove staging directory");
                    }
                } else if staging.exists() {
                    tracing::warn!(path = %staging.display(), "generation failed; staging directory left in place");
                }
                Err(e)
            }
        }
    }

    fn run(&mut self, staging: &Path) -> Result<PathBuf, EpubError> {
        self.create_directory_structure(staging)?;
        self.write_mimetype(staging)?;
        self.process_books(staging)?;
        self.write_container(staging)?;
        let epub = self.compress(staging)?;
        self.advance(AssemblyState::Done);
        Ok(epub)
    }

    fn advance(&mut self, next: AssemblyState) {
        tracing::info!(from = ?self.state, to = ?next, "assembly state");
        self.state = next;
    }

    /// Wipe any previous staging tree and create the fixed directory layout.
    fn create_directory_structure(&mut self, staging: &Path) -> Result<(), EpubError> {
        if staging.exists() {
            fs::remove_dir_all(staging).map_err(io_err(staging))?;
        }
        fs::create_dir_all(staging).map_err(io_err(staging))?;
        for dir in STAGING_SUBDIRS {
            let path = staging.join(dir);
            fs::create_dir_all(&path).map_err(io_err(&path))?;
        }
        self.advance(AssemblyState::DirectoryCreated);
        Ok(())
    }

    fn write_mimetype(&mut self, staging: &Path) -> Result<(), EpubError> {
        let path = staging.join(MIMETYPE_FILE);
        fs::write(&path, MIMETYPE).map_err(io_err(&path))?;
        self.advance(AssemblyState::MimetypeWritten);
        Ok(())
    }

    fn process_books(&mut self, staging: &Path) -> Result<(), EpubError> {
        if self.books.is_empty() {
            return Err(EpubError::NoBooks);
        }
        let content_dir = staging.join(CONTENT_DIR);
        self.container = Container::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (index, book) in self.books.iter_mut().enumerate() {
            let layout = BookLayout::for_index(index);
            self.container
                .register_rendition(format!("{}/{}", CONTENT_DIR, layout.package_file));
            for path in book.write(&content_dir, &layout)? {
                if !seen.insert(path.clone()) {
                    return Err(EpubError::DuplicatePath { path });
                }
            }
        }
        self.advance(AssemblyState::BooksProcessed);
        Ok(())
    }

    fn write_container(&mut self, staging: &Path) -> Result<(), EpubError> {
        write_document(
            &self.container.to_document(),
            &staging.join(META_INF_DIR).join("container.xml"),
        )?;
        self.advance(AssemblyState::ContainerWritten);
        Ok(())
    }

    /// Zip the staging tree, move the archive to `<stem>.epub` and delete the staging
    /// tree. A partly written `<stem>.zip` is removed when any of this fails.
    fn compress(&mut self, staging: &Path) -> Result<PathBuf, EpubError> {
        let stem = self.file_stem()?;
        let zip_path = self.output_dir.join(format!("{}.zip", stem));
        let epub_path = self.output_dir.join(format!("{}.epub", stem));

        let written = write_archive(staging, &zip_path)
            .and_then(|()| fs::rename(&zip_path, &epub_path).map_err(io_err(&epub_path)));
        if let Err(e) = written {
            match fs::remove_file(&zip_path) {
                Ok(()) => tracing::debug!(path = %zip_path.display(), "removed partial archive"),
                Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => {}
                Err(cleanup) => {
                    tracing::warn!(path = %zip_path.display(), error = %cleanup, "could not remove partial archive")
                }
            }
            return Err(e);
        }
        fs::remove_dir_all(staging).map_err(io_err(staging))?;
        self.advance(AssemblyState::Compressed);
        tracing::info!(path = %epub_path.display(), "wrote EPUB");
        Ok(epub_path)
    }
}

/// Write `staging` to a zip at `zip_path`: mimetype first and stored, then every other
/// file and directory in sorted path order, deflated.
fn write_archive(staging: &Path, zip_path: &Path) -> Result<(), EpubError> {
    let file = fs::File::create(zip_path).map_err(io_err(zip_path))?;
    let mut zip = ZipWriter::new(file);
    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    zip.start_file(MIMETYPE_FILE, options_stored)?;
    zip.write_all(MIMETYPE.as_bytes())?;

    for entry in WalkDir::new(staging).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(staging) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if name == MIMETYPE_FILE {
            continue;
        }
        if entry.file_type().is_dir() {
            zip.add_directory(name, options_deflate)?;
        } else {
            let data = fs::read(entry.path()).map_err(io_err(entry.path()))?;
            zip.start_file(name, options_deflate)?;
            zip.write_all(&data)?;
        }
    }
    zip.finish()?;
    Ok(())
}
