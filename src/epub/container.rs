//! `META-INF/container.xml`: the list of package documents in the archive.

use crate::epub::OPF_MEDIA_TYPE;
use crate::xml::{Document, Element};

pub const CONTAINER_NAMESPACE: &str = "urn:oasis:names:tc:opendocument:xmlns:container";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    /// Package document paths relative to the archive root, one per rendition.
    pub root_files: Vec<String>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_rendition(&mut self, full_path: impl Into<String>) {
        self.root_files.push(full_path.into());
    }

    pub fn to_document(&self) -> Document {
        let mut rootfiles = Element::new("rootfiles");
        for path in &self.root_files {
            rootfiles.push(
                Element::new("rootfile")
                    .with_attr("full-path", path.as_str())
                    .with_attr("media-type", OPF_MEDIA_TYPE),
            );
        }
        Document::new(
            Element::new("container")
                .with_attr("version", "1.0")
                .with_attr("xmlns", CONTAINER_NAMESPACE)
                .with_child(rootfiles),
        )
    }
}
