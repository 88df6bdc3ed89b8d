//! Chapters, the source they are pulled from, and the lazily realized sequence.

use crate::epub::slug::chapter_slug;
use crate::epub::EpubError;
use crate::xml::{Document, Element, Node};
use serde::Serialize;

pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
pub const XHTML_DOCTYPE: &str = "<!DOCTYPE html>";
/// Stylesheet link target, relative to a chapter document.
pub const STYLESHEET_HREF: &str = "../Styles/stylesheet.css";

/// Error type returned by a [ChapterSource].
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One chapter as handed over by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedChapter {
    pub title: String,
    pub content: Vec<Node>,
}

/// Forward-only supplier of chapters.
///
/// `Ok(None)` ends the sequence. An `Err` is fatal for the book being built.
pub trait ChapterSource {
    fn next_chapter(&mut self) -> Result<Option<SourcedChapter>, SourceError>;
}

impl<S: ChapterSource + ?Sized> ChapterSource for Box<S> {
    fn next_chapter(&mut self) -> Result<Option<SourcedChapter>, SourceError> {
        (**self).next_chapter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterKind {
    /// Synthetic page holding only the book title.
    Title,
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// 0 for the title chapter, 1.. for content.
    pub number: usize,
    pub title: String,
    pub content: Vec<Node>,
    pub kind: ChapterKind,
}

impl Chapter {
    pub fn title_page(title: impl Into<String>) -> Self {
        Self {
            number: 0,
            title: title.into(),
            content: Vec::new(),
            kind: ChapterKind::Title,
        }
    }

    pub fn content(number: usize, sourced: SourcedChapter) -> Self {
        Self {
            number,
            title: sourced.title,
            content: sourced.content,
            kind: ChapterKind::Content,
        }
    }

    pub fn file_name(&self) -> String {
        format!("chapter_{:03}_{}.xhtml", self.number, chapter_slug(&self.title))
    }

    /// Path relative to the content root, e.g. `Text/chapter_001_Bonds_1_1.xhtml`.
    pub fn path(&self, text_dir: &str) -> String {
        format!("{}/{}", text_dir, self.file_name())
    }

    /// Standalone XHTML page: head title and h1 set to the chapter title, followed
    /// by a copy of every content node.
    pub fn create_document(&self) -> Document {
        self.document_with_stylesheet(STYLESHEET_HREF)
    }

    /// Like [Chapter::create_document] for chapters stored deeper than `Text/`.
    pub fn document_with_stylesheet(&self, stylesheet_href: &str) -> Document {
        let head = Element::new("head")
            .with_child(Element::new("title").with_text(self.title.as_str()))
            .with_child(
                Element::new("link")
                    .with_attr("rel", "stylesheet")
                    .with_attr("type", "text/css")
                    .with_attr("href", stylesheet_href),
            );
        let mut body = Element::new("body").with_child(Element::new("h1").with_text(self.title.as_str()));
        body.children.extend(self.content.iter().cloned());
        let html = Element::new("html")
            .with_attr("xmlns", XHTML_NAMESPACE)
            .with_child(head)
            .with_child(body);
        Document::new(html).with_doctype(XHTML_DOCTYPE)
    }
}

/// Chapters realized so far, in front of a source that can produce more.
///
/// Index 0 is always the title chapter. Indexing past the realized frontier pulls
/// from the source until the index is reached or the source ends. Once the source
/// has ended it is never asked again.
pub struct ChapterSequence<S> {
    source: S,
    chapters: Vec<Chapter>,
    exhausted: bool,
}

impl<S: ChapterSource> ChapterSequence<S> {
    pub fn new(book_title: impl Into<String>, source: S) -> Self {
        Self {
            source,
            chapters: vec![Chapter::title_page(book_title)],
            exhausted: false,
        }
    }

    /// Chapters fetched so far.
    pub fn realized(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        if let Some(first) = self.chapters.first_mut() {
            first.title = title.into();
        }
    }

    /// Pull one more chapter. `Ok(None)` once the source has ended.
    pub fn fetch_next(&mut self) -> Result<Option<&Chapter>, EpubError> {
        if self.exhausted {
            return Ok(None);
        }
        let number = self.chapters.len();
        match self.source.next_chapter() {
            Ok(Some(sourced)) => {
                tracing::info!(number, title = %sourced.title, "realized chapter");
                self.chapters.push(Chapter::content(number, sourced));
                Ok(self.chapters.last())
            }
            Ok(None) => {
                tracing::debug!(chapters = number, "chapter source exhausted");
                self.exhausted = true;
                Ok(None)
            }
            Err(source) => Err(EpubError::Source { number, source }),
        }
    }

    pub fn get(&mut self, index: usize) -> Result<&Chapter, EpubError> {
        while self.chapters.len() <= index {
            if self.fetch_next()?.is_none() {
                return Err(EpubError::ChapterOutOfRange {
                    index,
                    available: self.chapters.len(),
                });
            }
        }
        Ok(&self.chapters[index])
    }

    /// Fetch until the source ends and return every chapter.
    pub fn materialize_all(&mut self) -> Result<&[Chapter], EpubError> {
        while self.fetch_next()?.is_some() {}
        Ok(&self.chapters)
    }
}
