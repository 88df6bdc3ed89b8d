//! The package document (`content_<n>.opf`).

use crate::epub::chapter::Chapter;
use crate::epub::manifest::{Direction, Item, Manifest, RenditionHints, Spine};
use crate::epub::meta::{IdAllocator, MetaData, DEFAULT_IDENTIFIER_ID};
use crate::epub::navigation::TableOfContents;
use crate::epub::{write_document, EpubError};
use crate::xml::{Document, Element};
use std::path::Path;

pub const OPF_NAMESPACE: &str = "http://www.idpf.org/2007/opf";

/// Metadata, manifest and spine of one book.
///
/// Manifest and spine are only reachable through the `register_*` methods, so every
/// chapter in the manifest is also in the spine, in registration order.
#[derive(Debug, Clone)]
pub struct PackageDocument {
    pub version: String,
    /// Id of the identifier that uniquely identifies this publication.
    pub unique_identifier: String,
    pub prefix: Option<String>,
    /// Written as `xml:lang`.
    pub language: Option<String>,
    pub text_direction: Option<Direction>,
    pub id: Option<String>,
    pub metadata: MetaData,
    manifest: Manifest,
    spine: Spine,
}

impl Default for PackageDocument {
    fn default() -> Self {
        Self {
            version: "3.0".to_string(),
            unique_identifier: DEFAULT_IDENTIFIER_ID.to_string(),
            prefix: None,
            language: None,
            text_direction: None,
            id: None,
            metadata: MetaData::default(),
            manifest: Manifest::new(),
            spine: Spine::new(),
        }
    }
}

impl PackageDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn spine(&self) -> &Spine {
        &self.spine
    }

    /// Add a chapter at `path` to the manifest and append it to the spine.
    pub fn register_chapter(&mut self, chapter: &Chapter, path: &str) -> Result<Item, EpubError> {
        let item = self.manifest.register_chapter(path)?;
        self.spine.append_item(&item, RenditionHints::default());
        tracing::debug!(number = chapter.number, id = %item.id, "registered chapter");
        Ok(item)
    }

    /// Add both navigation documents to the manifest and point the spine's `toc` at the NCX.
    pub fn register_table_of_contents(&mut self, toc: &TableOfContents) -> Result<Item, EpubError> {
        let ncx = self
            .manifest
            .register_table_of_contents(&toc.ncx_href, &toc.nav_href)?;
        self.spine.toc = Some(ncx.id.clone());
        Ok(ncx)
    }

    pub fn register_stylesheet(&mut self, path: &str) -> Result<Item, EpubError> {
        self.manifest.register_stylesheet(path)
    }

    /// Value of the unique identifier, used as the NCX `dtb:uid`.
    pub fn unique_identifier_value(&self) -> Result<String, EpubError> {
        self.metadata
            .identifier_value(&self.unique_identifier)
            .ok_or(EpubError::MissingMetadata {
                kind: "unique identifier",
            })
    }

    pub fn to_document(&self) -> Result<Document, EpubError> {
        self.metadata.check_required()?;
        self.unique_identifier_value()?;

        let mut ids = IdAllocator::new();
        if let Some(id) = &self.id {
            ids.reserve(id)?;
        }
        for item in self.manifest.items() {
            let mut next = Some(item);
            while let Some(i) = next {
                ids.reserve(&i.id)?;
                next = i.fallback.as_deref();
            }
        }

        let mut package = Element::new("package")
            .with_attr("xmlns", OPF_NAMESPACE)
            .with_attr("version", self.version.as_str())
            .with_attr("unique-identifier", self.unique_identifier.as_str())
            .with_opt_attr("prefix", self.prefix.as_deref())
            .with_opt_attr("xml:lang", self.language.as_deref())
            .with_opt_attr("dir", self.text_direction.map(|d| d.as_str()))
            .with_opt_attr("id", self.id.as_deref());
        self.metadata.append_to(&mut package, &mut ids)?;
        self.manifest.append_to(&mut package);
        self.spine.append_to(&mut package);
        Ok(Document::new(package))
    }

    pub fn write(&self, path: &Path) -> Result<(), EpubError> {
        write_document(&self.to_document()?, path)
    }
}
