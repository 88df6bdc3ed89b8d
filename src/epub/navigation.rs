//! Table of contents in both formats: NCX for EPUB 2 readers and the XHTML nav document.

use crate::epub::chapter::{Chapter, XHTML_DOCTYPE, XHTML_NAMESPACE};
use crate::epub::{write_document, EpubError};
use crate::xml::{Document, Element};
use std::path::Path;

pub const NCX_NAMESPACE: &str = "http://www.daisy.org/z3986/2005/ncx/";
pub const OPS_NAMESPACE: &str = "http://www.idpf.org/2007/ops";

/// File names of the two navigation documents, relative to the content root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOfContents {
    pub ncx_href: String,
    pub nav_href: String,
}

impl Default for TableOfContents {
    fn default() -> Self {
        Self::new("toc.ncx", "toc.xhtml")
    }
}

impl TableOfContents {
    pub fn new(ncx_href: impl Into<String>, nav_href: impl Into<String>) -> Self {
        Self {
            ncx_href: ncx_href.into(),
            nav_href: nav_href.into(),
        }
    }

    /// NCX document. `playOrder` is the chapter number plus one.
    pub fn to_ncx(&self, title: &str, uid: &str, chapters: &[Chapter], text_dir: &str) -> Document {
        let mut nav_map = Element::new("navMap");
        for chapter in chapters {
            let order = chapter.number + 1;
            nav_map.push(
                Element::new("navPoint")
                    .with_attr("id", format!("navPoint-{}", order))
                    .with_attr("playOrder", order.to_string())
                    .with_child(
                        Element::new("navLabel")
                            .with_child(Element::new("text").with_text(chapter.title.as_str())),
                    )
                    .with_child(Element::new("content").with_attr("src", chapter.path(text_dir))),
            );
        }
        let ncx = Element::new("ncx")
            .with_attr("xmlns", NCX_NAMESPACE)
            .with_attr("version", "2005-1")
            .with_child(
                Element::new("head").with_child(
                    Element::new("meta")
                        .with_attr("name", "dtb:uid")
                        .with_attr("content", uid),
                ),
            )
            .with_child(Element::new("docTitle").with_child(Element::new("text").with_text(title)))
            .with_child(nav_map);
        Document::new(ncx)
    }

    /// XHTML nav document with one list entry per chapter.
    pub fn to_nav(&self, title: &str, chapters: &[Chapter], text_dir: &str) -> Document {
        let mut list = Element::new("ol");
        for chapter in chapters {
            list.push(
                Element::new("li").with_child(
                    Element::new("a")
                        .with_attr("href", chapter.path(text_dir))
                        .with_text(chapter.title.as_str()),
                ),
            );
        }
        let html = Element::new("html")
            .with_attr("xmlns", XHTML_NAMESPACE)
            .with_attr("xmlns:epub", OPS_NAMESPACE)
            .with_child(Element::new("head").with_child(Element::new("title").with_text(title)))
            .with_child(
                Element::new("body").with_child(
                    Element::new("nav")
                        .with_attr("epub:type", "toc")
                        .with_attr("id", "toc")
                        .with_child(Element::new("h1").with_text(title))
                        .with_child(list),
                ),
            );
        Document::new(html).with_doctype(XHTML_DOCTYPE)
    }

    /// Write both documents under `content_dir`.
    pub fn write(
        &self,
        content_dir: &Path,
        title: &str,
        uid: &str,
        chapters: &[Chapter],
        text_dir: &str,
    ) -> Result<(), EpubError> {
        write_document(
            &self.to_ncx(title, uid, chapters, text_dir),
            &content_dir.join(&self.ncx_href),
        )?;
        write_document(
            &self.to_nav(title, chapters, text_dir),
            &content_dir.join(&self.nav_href),
        )
    }
}
