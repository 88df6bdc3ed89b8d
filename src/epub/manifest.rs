//! Manifest items and spine itemrefs.

use crate::epub::{EpubError, CSS_MEDIA_TYPE, NCX_MEDIA_TYPE, XHTML_MEDIA_TYPE};
use crate::xml::Element;

/// Role flags of a manifest item, serialized as the `properties` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemProperties {
    pub cover_image: bool,
    pub nav: bool,
    pub scripted: bool,
    pub svg: bool,
    pub mathml: bool,
    pub switch: bool,
    pub remote_resources: bool,
}

impl ItemProperties {
    fn tokens(&self) -> Vec<&'static str> {
        [
            (self.cover_image, "cover-image"),
            (self.nav, "nav"),
            (self.scripted, "scripted"),
            (self.svg, "svg"),
            (self.mathml, "mathml"),
            (self.switch, "switch"),
            (self.remote_resources, "remote-resources"),
        ]
        .into_iter()
        .filter_map(|(set, token)| set.then_some(token))
        .collect()
    }
}

/// Space-joined tokens, or `None` when there are none.
fn joined(tokens: Vec<&'static str>) -> Option<String> {
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

/// One manifest resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    /// Relative to the package document.
    pub href: String,
    pub media_type: String,
    /// Written right after this item; its id goes in the `fallback` attribute.
    pub fallback: Option<Box<Item>>,
    pub media_overlay: Option<String>,
    pub properties: ItemProperties,
}

impl Item {
    pub fn new(id: impl Into<String>, href: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            fallback: None,
            media_overlay: None,
            properties: ItemProperties::default(),
        }
    }

    /// Item whose id is the last segment of `href`.
    pub fn from_href(href: impl Into<String>, media_type: impl Into<String>) -> Self {
        let href = href.into();
        let id = href.rsplit('/').next().unwrap_or(href.as_str()).to_string();
        Self::new(id, href, media_type)
    }

    pub fn with_properties(mut self, properties: ItemProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_fallback(mut self, fallback: Item) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn with_media_overlay(mut self, id: impl Into<String>) -> Self {
        self.media_overlay = Some(id.into());
        self
    }

    pub fn append_to(&self, manifest: &mut Element) {
        manifest.push(
            Element::new("item")
                .with_attr("id", self.id.as_str())
                .with_attr("href", self.href.as_str())
                .with_attr("media-type", self.media_type.as_str())
                .with_opt_attr("fallback", self.fallback.as_ref().map(|f| f.id.as_str()))
                .with_opt_attr("media-overlay", self.media_overlay.as_deref())
                .with_opt_attr("properties", joined(self.properties.tokens())),
        );
        if let Some(fallback) = &self.fallback {
            fallback.append_to(manifest);
        }
    }

    /// This item followed by its fallback chain.
    fn chain(&self) -> impl Iterator<Item = &Item> {
        std::iter::successors(Some(self), |i| i.fallback.as_deref())
    }
}

/// Registered resources in registration order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    items: Vec<Item>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.iter().flat_map(Item::chain).find(|i| i.id == id)
    }

    /// Append `item`, rejecting an id or href already present (fallbacks included).
    pub fn add(&mut self, item: Item) -> Result<Item, EpubError> {
        for new in item.chain() {
            for existing in self.items.iter().flat_map(Item::chain) {
                if existing.id == new.id {
                    return Err(EpubError::DuplicateId { id: new.id.clone() });
                }
                if existing.href == new.href {
                    return Err(EpubError::DuplicateHref {
                        href: new.href.clone(),
                    });
                }
            }
        }
        self.items.push(item.clone());
        Ok(item)
    }

    /// Register an XHTML chapter; the id is the last segment of `path`.
    pub fn register_chapter(&mut self, path: &str) -> Result<Item, EpubError> {
        self.add(Item::from_href(path, XHTML_MEDIA_TYPE))
    }

    /// Register both navigation documents. Returns the NCX item, which the spine's
    /// `toc` attribute points at.
    pub fn register_table_of_contents(&mut self, ncx_href: &str, nav_href: &str) -> Result<Item, EpubError> {
        let ncx = self.add(Item::from_href(ncx_href, NCX_MEDIA_TYPE))?;
        self.add(Item::from_href(nav_href, XHTML_MEDIA_TYPE).with_properties(ItemProperties {
            nav: true,
            ..ItemProperties::default()
        }))?;
        Ok(ncx)
    }

    pub fn register_stylesheet(&mut self, path: &str) -> Result<Item, EpubError> {
        self.add(Item::from_href(path, CSS_MEDIA_TYPE))
    }

    pub fn append_to(&self, package: &mut Element) {
        let mut manifest = Element::new("manifest");
        for item in &self.items {
            item.append_to(&mut manifest);
        }
        package.push(manifest);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Auto,
    Paginated,
    ScrolledContinuous,
    ScrolledDoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    PrePaginated,
    Reflowable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Auto,
    Landscape,
    Portrait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSpread {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadCondition {
    Auto,
    Both,
    Landscape,
    None,
}

/// Per-itemref rendition overrides. Each hint is independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenditionHints {
    pub flow: Option<Flow>,
    pub layout: Option<Layout>,
    pub orientation: Option<Orientation>,
    pub page_spread: Option<PageSpread>,
    pub spread: Option<SpreadCondition>,
    pub align_x_center: bool,
}

impl RenditionHints {
    fn tokens(&self) -> Vec<&'static str> {
        let mut tokens = Vec::new();
        if let Some(flow) = self.flow {
            tokens.push(match flow {
                Flow::Auto => "rendition:flow-auto",
                Flow::Paginated => "rendition:flow-paginated",
                Flow::ScrolledContinuous => "rendition:flow-scrolled-continuous",
                Flow::ScrolledDoc => "rendition:flow-scrolled-doc",
            });
        }
        if let Some(layout) = self.layout {
            tokens.push(match layout {
                Layout::PrePaginated => "rendition:layout-pre-paginated",
                Layout::Reflowable => "rendition:layout-reflowable",
            });
        }
        if let Some(orientation) = self.orientation {
            tokens.push(match orientation {
                Orientation::Auto => "rendition:orientation-auto",
                Orientation::Landscape => "rendition:orientation-landscape",
                Orientation::Portrait => "rendition:orientation-portrait",
            });
        }
        if let Some(page_spread) = self.page_spread {
            tokens.push(match page_spread {
                PageSpread::Left => "page-spread-left",
                PageSpread::Right => "page-spread-right",
                PageSpread::Center => "rendition:page-spread-center",
            });
        }
        if let Some(spread) = self.spread {
            tokens.push(match spread {
                SpreadCondition::Auto => "rendition:spread-auto",
                SpreadCondition::Both => "rendition:spread-both",
                SpreadCondition::Landscape => "rendition:spread-landscape",
                SpreadCondition::None => "rendition:spread-none",
            });
        }
        if self.align_x_center {
            tokens.push("rendition:align-x-center");
        }
        tokens
    }
}

/// One spine entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub idref: String,
    /// `linear="yes"` / `"no"`; omitted when unset.
    pub linear: Option<bool>,
    pub hints: RenditionHints,
}

impl ItemRef {
    pub fn append_to(&self, spine: &mut Element) {
        let linear = self.linear.map(|l| if l { "yes" } else { "no" });
        spine.push(
            Element::new("itemref")
                .with_attr("idref", self.idref.as_str())
                .with_opt_attr("linear", linear)
                .with_opt_attr("properties", joined(self.hints.tokens())),
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
    Default,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Ltr => "ltr",
            Direction::Rtl => "rtl",
            Direction::Default => "default",
        }
    }
}

/// Reading order. Itemrefs stay in the order they were appended.
#[derive(Debug, Clone, Default)]
pub struct Spine {
    itemrefs: Vec<ItemRef>,
    /// Id of the NCX item.
    pub toc: Option<String>,
    pub page_progression_direction: Option<Direction>,
}

impl Spine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn itemrefs(&self) -> &[ItemRef] {
        &self.itemrefs
    }

    pub fn append_item(&mut self, item: &Item, hints: RenditionHints) -> ItemRef {
        let itemref = ItemRef {
            idref: item.id.clone(),
            linear: None,
            hints,
        };
        self.itemrefs.push(itemref.clone());
        itemref
    }

    pub fn append_to(&self, package: &mut Element) {
        let mut spine = Element::new("spine")
            .with_opt_attr("toc", self.toc.as_deref())
            .with_opt_attr(
                "page-progression-direction",
                self.page_progression_direction.map(Direction::as_str),
            );
        for itemref in &self.itemrefs {
            itemref.append_to(&mut spine);
        }
        package.push(spine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_id_is_last_path_segment() -> Result<(), EpubError> {
        let mut manifest = Manifest::new();
        let a = manifest.register_chapter("Text/chapter_001_One.xhtml")?;
        let b = manifest.register_chapter("Text/chapter_002_Two.xhtml")?;
        assert_eq!(a.id, "chapter_001_One.xhtml");
        assert_eq!(b.id, "chapter_002_Two.xhtml");
        assert_eq!(a.media_type, XHTML_MEDIA_TYPE);
        Ok(())
    }

    #[test]
    fn duplicate_href_is_rejected() -> Result<(), EpubError> {
        let mut manifest = Manifest::new();
        manifest.register_chapter("Text/a.xhtml")?;
        assert!(matches!(
            manifest.register_chapter("Text/a.xhtml"),
            Err(EpubError::DuplicateId { .. })
        ));
        assert!(matches!(
            manifest.add(Item::new("other", "Text/a.xhtml", XHTML_MEDIA_TYPE)),
            Err(EpubError::DuplicateHref { .. })
        ));
        assert_eq!(manifest.items().len(), 1);
        Ok(())
    }

    #[test]
    fn same_file_name_in_different_directories_collides_on_id() -> Result<(), EpubError> {
        let mut manifest = Manifest::new();
        manifest.register_chapter("Text/a.xhtml")?;
        assert!(matches!(
            manifest.register_chapter("Other/a.xhtml"),
            Err(EpubError::DuplicateId { id }) if id == "a.xhtml"
        ));
        Ok(())
    }

    #[test]
    fn table_of_contents_registers_two_items() -> Result<(), EpubError> {
        let mut manifest = Manifest::new();
        let ncx = manifest.register_table_of_contents("toc.ncx", "toc.xhtml")?;
        assert_eq!(ncx.media_type, NCX_MEDIA_TYPE);
        let mut package = Element::new("package");
        manifest.append_to(&mut package);
        assert_eq!(
            package.to_xml(),
            concat!(
                "<package><manifest>",
                r#"<item id="toc.ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#,
                r#"<item id="toc.xhtml" href="toc.xhtml" media-type="application/xhtml+xml" properties="nav"/>"#,
                "</manifest></package>"
            )
        );
        Ok(())
    }

    #[test]
    fn properties_are_space_joined_in_fixed_order() {
        let item = Item::new("c", "cover.svg", "image/svg+xml").with_properties(ItemProperties {
            svg: true,
            cover_image: true,
            remote_resources: true,
            ..ItemProperties::default()
        });
        let mut manifest = Element::new("manifest");
        item.append_to(&mut manifest);
        assert!(manifest
            .to_xml()
            .contains(r#"properties="cover-image svg remote-resources""#));
    }

    #[test]
    fn fallback_follows_item() {
        let item = Item::new("img", "a.webp", "image/webp")
            .with_fallback(Item::new("img-png", "a.png", "image/png"))
            .with_media_overlay("smil");
        let mut manifest = Element::new("manifest");
        item.append_to(&mut manifest);
        assert_eq!(
            manifest.to_xml(),
            concat!(
                "<manifest>",
                r#"<item id="img" href="a.webp" media-type="image/webp" fallback="img-png" media-overlay="smil"/>"#,
                r#"<item id="img-png" href="a.png" media-type="image/png"/>"#,
                "</manifest>"
            )
        );
    }

    #[test]
    fn spine_keeps_append_order() -> Result<(), EpubError> {
        let mut manifest = Manifest::new();
        let mut spine = Spine::new();
        for path in ["Text/c1.xhtml", "Text/c2.xhtml", "Text/c3.xhtml"] {
            let item = manifest.register_chapter(path)?;
            spine.append_item(&item, RenditionHints::default());
        }
        let order: Vec<&str> = spine.itemrefs().iter().map(|r| r.idref.as_str()).collect();
        assert_eq!(order, vec!["c1.xhtml", "c2.xhtml", "c3.xhtml"]);
        Ok(())
    }

    #[test]
    fn itemref_hints_and_linear() {
        let mut spine = Spine::new();
        spine.toc = Some("toc.ncx".to_string());
        spine.page_progression_direction = Some(Direction::Rtl);
        let item = Item::new("c1", "c1.xhtml", XHTML_MEDIA_TYPE);
        spine.append_item(
            &item,
            RenditionHints {
                layout: Some(Layout::PrePaginated),
                page_spread: Some(PageSpread::Center),
                align_x_center: true,
                ..RenditionHints::default()
            },
        );
        spine.itemrefs[0].linear = Some(false);
        let mut package = Element::new("package");
        spine.append_to(&mut package);
        assert_eq!(
            package.to_xml(),
            concat!(
                r#"<package><spine toc="toc.ncx" page-progression-direction="rtl">"#,
                r#"<itemref idref="c1" linear="no" properties="rendition:layout-pre-paginated rendition:page-spread-center rendition:align-x-center"/>"#,
                "</spine></package>"
            )
        );
    }

    #[test]
    fn empty_hints_omit_properties() {
        let mut spine = Element::new("spine");
        ItemRef {
            idref: "a".to_string(),
            linear: None,
            hints: RenditionHints::default(),
        }
        .append_to(&mut spine);
        assert_eq!(spine.to_xml(), r#"<spine><itemref idref="a"/></spine>"#);
    }
}
