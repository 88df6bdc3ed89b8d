//! Package metadata: Dublin Core properties and their `refines` sub-elements.
//!
//! Each property kind is plain data. Serialization emits the main element followed by
//! one `<meta refines="#id">` sibling per refinement, in a fixed order: alternate
//! script, display sequence, file-as, authority, then the kind's own extras. A
//! property that needs refinements but has no id gets a generated one.

use crate::epub::EpubError;
use crate::xml::Element;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::{HashMap, HashSet};

pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_LANGUAGE: &str = "en";
/// Id of the default identifier; the package's `unique-identifier` points here.
pub const DEFAULT_IDENTIFIER_ID: &str = "BookID";

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Dublin Core element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Title,
    Creator,
    Identifier,
    Contributor,
    Coverage,
    Date,
    Description,
    Format,
    Language,
    Publisher,
    Relation,
    Rights,
    Source,
    Subject,
    Type,
}

impl PropertyKind {
    pub fn tag(self) -> &'static str {
        match self {
            PropertyKind::Title => "dc:title",
            PropertyKind::Creator => "dc:creator",
            PropertyKind::Identifier => "dc:identifier",
            PropertyKind::Contributor => "dc:contributor",
            PropertyKind::Coverage => "dc:coverage",
            PropertyKind::Date => "dc:date",
            PropertyKind::Description => "dc:description",
            PropertyKind::Format => "dc:format",
            PropertyKind::Language => "dc:language",
            PropertyKind::Publisher => "dc:publisher",
            PropertyKind::Relation => "dc:relation",
            PropertyKind::Rights => "dc:rights",
            PropertyKind::Source => "dc:source",
            PropertyKind::Subject => "dc:subject",
            PropertyKind::Type => "dc:type",
        }
    }

    /// Prefix for generated ids (`creator-0`, `creator-1`, ...).
    fn id_prefix(self) -> &'static str {
        self.tag().trim_start_matches("dc:")
    }
}

/// Value of a property: free text or a date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Date(NaiveDateTime),
}

impl PropertyValue {
    pub fn render(&self) -> String {
        match self {
            PropertyValue::Text(s) => s.clone(),
            PropertyValue::Date(d) => d.format(DATE_FORMAT).to_string(),
        }
    }
}

impl Default for PropertyValue {
    fn default() -> Self {
        PropertyValue::Text(String::new())
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<NaiveDateTime> for PropertyValue {
    fn from(d: NaiveDateTime) -> Self {
        PropertyValue::Date(d)
    }
}

/// Fields common to every metadata property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaProperty {
    pub value: PropertyValue,
    /// Unique across the whole package document; target of `refines`.
    pub id: Option<String>,
    pub file_as: Option<String>,
    pub alternate_script: Option<String>,
    /// Only honoured when the property is serialized on its own. In a [MetaData] list
    /// the position in the list decides.
    pub display_seq: Option<usize>,
    pub meta_authority: Option<String>,
}

impl MetaProperty {
    pub fn new(value: impl Into<PropertyValue>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_file_as(mut self, file_as: impl Into<String>) -> Self {
        self.file_as = Some(file_as.into());
        self
    }

    pub fn with_alternate_script(mut self, text: impl Into<String>) -> Self {
        self.alternate_script = Some(text.into());
        self
    }

    pub fn with_display_seq(mut self, seq: usize) -> Self {
        self.display_seq = Some(seq);
        self
    }

    pub fn with_meta_authority(mut self, authority: impl Into<String>) -> Self {
        self.meta_authority = Some(authority.into());
        self
    }

    fn has_refinements(&self) -> bool {
        self.file_as.is_some() || self.alternate_script.is_some() || self.meta_authority.is_some()
    }

    /// Serialize as a `kind` element using its own `display_seq`.
    pub fn append_to(
        &self,
        kind: PropertyKind,
        parent: &mut Element,
        ids: &mut IdAllocator,
    ) -> Result<(), EpubError> {
        self.append_entry(kind, parent, ids, self.display_seq)
    }
}

impl From<&str> for MetaProperty {
    fn from(s: &str) -> Self {
        MetaProperty::new(s)
    }
}

impl From<String> for MetaProperty {
    fn from(s: String) -> Self {
        MetaProperty::new(s)
    }
}

/// `dc:title` with an optional `title-type` (main, subtitle, collection, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Title {
    pub property: MetaProperty,
    pub title_type: Option<String>,
}

impl Title {
    pub fn new(property: impl Into<MetaProperty>) -> Self {
        Self {
            property: property.into(),
            title_type: None,
        }
    }

    pub fn with_type(mut self, title_type: impl Into<String>) -> Self {
        self.title_type = Some(title_type.into());
        self
    }

    pub fn append_to(&self, parent: &mut Element, ids: &mut IdAllocator) -> Result<(), EpubError> {
        self.append_entry(PropertyKind::Title, parent, ids, self.property.display_seq)
    }
}

/// `dc:identifier` with an optional `identifier-type` and its scheme (e.g. `onix:codelist5`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifier {
    pub property: MetaProperty,
    pub identifier_type: Option<String>,
    pub scheme: Option<String>,
}

impl Identifier {
    pub fn new(property: impl Into<MetaProperty>) -> Self {
        Self {
            property: property.into(),
            identifier_type: None,
            scheme: None,
        }
    }

    pub fn with_type(mut self, identifier_type: impl Into<String>, scheme: Option<&str>) -> Self {
        self.identifier_type = Some(identifier_type.into());
        self.scheme = scheme.map(String::from);
        self
    }

    pub fn append_to(&self, parent: &mut Element, ids: &mut IdAllocator) -> Result<(), EpubError> {
        self.append_entry(PropertyKind::Identifier, parent, ids, self.property.display_seq)
    }
}

/// Creator or contributor, with an optional MARC relator role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    pub property: MetaProperty,
    pub role: Option<String>,
    pub role_scheme: Option<String>,
}

impl Person {
    pub fn new(property: impl Into<MetaProperty>) -> Self {
        Self {
            property: property.into(),
            role: None,
            role_scheme: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>, scheme: Option<&str>) -> Self {
        self.role = Some(role.into());
        self.role_scheme = scheme.map(String::from);
        self
    }

    /// `kind` is [PropertyKind::Creator] or [PropertyKind::Contributor].
    pub fn append_to(
        &self,
        kind: PropertyKind,
        parent: &mut Element,
        ids: &mut IdAllocator,
    ) -> Result<(), EpubError> {
        self.append_entry(kind, parent, ids, self.property.display_seq)
    }
}

/// `dc:source` with an optional `source-of` (e.g. `pagination`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Source {
    pub property: MetaProperty,
    pub source_of: Option<String>,
}

impl Source {
    pub fn new(property: impl Into<MetaProperty>) -> Self {
        Self {
            property: property.into(),
            source_of: None,
        }
    }

    pub fn with_source_of(mut self, source_of: impl Into<String>) -> Self {
        self.source_of = Some(source_of.into());
        self
    }

    pub fn append_to(&self, parent: &mut Element, ids: &mut IdAllocator) -> Result<(), EpubError> {
        self.append_entry(PropertyKind::Source, parent, ids, self.property.display_seq)
    }
}

/// A `belongs-to-collection` entry. A child collection is a series within this one
/// and refines this collection's id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    pub property: MetaProperty,
    pub collection_type: Option<String>,
    pub group_position: Option<u32>,
    /// Emitted as a `dcterms:identifier` refinement.
    pub identifier: Option<String>,
    /// Id of the element this top-level collection refines, if any.
    pub refines_id: Option<String>,
    pub child: Option<Box<Collection>>,
}

impl Collection {
    pub fn new(property: impl Into<MetaProperty>) -> Self {
        Self {
            property: property.into(),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, collection_type: impl Into<String>) -> Self {
        self.collection_type = Some(collection_type.into());
        self
    }

    pub fn with_group_position(mut self, position: u32) -> Self {
        self.group_position = Some(position);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_child(mut self, child: Collection) -> Self {
        self.child = Some(Box::new(child));
        self
    }

    pub fn append_to(&self, parent: &mut Element, ids: &mut IdAllocator) -> Result<(), EpubError> {
        self.append_collection(parent, ids, self.property.display_seq, self.refines_id.as_deref())
    }

    fn append_collection(
        &self,
        parent: &mut Element,
        ids: &mut IdAllocator,
        seq: Option<usize>,
        refines: Option<&str>,
    ) -> Result<(), EpubError> {
        let wants_id = self.property.has_refinements()
            || seq.is_some()
            || self.collection_type.is_some()
            || self.group_position.is_some()
            || self.identifier.is_some()
            || self.child.is_some();
        let id = resolve_id(&self.property, "collection", wants_id, ids);
        parent.push(
            Element::new("meta")
                .with_opt_attr("id", id.as_deref())
                .with_attr("property", "belongs-to-collection")
                .with_opt_attr("refines", refines.map(|r| format!("#{}", r)))
                .with_text(self.property.value.render()),
        );
        if let Some(id) = id.as_deref() {
            append_common_refinements(&self.property, id, seq, parent);
            if let Some(t) = &self.collection_type {
                refine(parent, id, "collection-type", t, None);
            }
            if let Some(p) = self.group_position {
                refine(parent, id, "group-position", &p.to_string(), None);
            }
            if let Some(identifier) = &self.identifier {
                refine(parent, id, "dcterms:identifier", identifier, None);
            }
            if let Some(child) = &self.child {
                child.append_collection(parent, ids, child.property.display_seq, Some(id))?;
            }
        }
        Ok(())
    }
}

/// Hands out document-unique ids.
///
/// Explicit ids are reserved up front so generated ids (`<kind>-<n>`) never collide
/// with them; reserving the same explicit id twice is an error.
#[derive(Debug, Default)]
pub struct IdAllocator {
    used: HashSet<String>,
    counters: HashMap<&'static str, usize>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, id: &str) -> Result<(), EpubError> {
        if !self.used.insert(id.to_string()) {
            return Err(EpubError::DuplicateId { id: id.to_string() });
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    fn claim(&mut self, id: &str) {
        self.used.insert(id.to_string());
    }

    pub fn generate(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_insert(0);
        loop {
            let candidate = format!("{}-{}", prefix, counter);
            *counter += 1;
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Serialization of one list entry; `seq` is the display-seq to stamp, if any.
trait AppendEntry {
    fn append_entry(
        &self,
        kind: PropertyKind,
        parent: &mut Element,
        ids: &mut IdAllocator,
        seq: Option<usize>,
    ) -> Result<(), EpubError>;
}

impl AppendEntry for MetaProperty {
    fn append_entry(
        &self,
        kind: PropertyKind,
        parent: &mut Element,
        ids: &mut IdAllocator,
        seq: Option<usize>,
    ) -> Result<(), EpubError> {
        let wants_id = self.has_refinements() || seq.is_some();
        if let Some(id) = append_main(kind, self, wants_id, parent, ids) {
            append_common_refinements(self, &id, seq, parent);
        }
        Ok(())
    }
}

impl AppendEntry for Title {
    fn append_entry(
        &self,
        kind: PropertyKind,
        parent: &mut Element,
        ids: &mut IdAllocator,
        seq: Option<usize>,
    ) -> Result<(), EpubError> {
        let wants_id = self.property.has_refinements() || seq.is_some() || self.title_type.is_some();
        if let Some(id) = append_main(kind, &self.property, wants_id, parent, ids) {
            if let Some(t) = &self.title_type {
                refine(parent, &id, "title-type", t, None);
            }
            append_common_refinements(&self.property, &id, seq, parent);
        }
        Ok(())
    }
}

impl AppendEntry for Identifier {
    fn append_entry(
        &self,
        kind: PropertyKind,
        parent: &mut Element,
        ids: &mut IdAllocator,
        seq: Option<usize>,
    ) -> Result<(), EpubError> {
        let wants_id =
            self.property.has_refinements() || seq.is_some() || self.identifier_type.is_some();
        if let Some(id) = append_main(kind, &self.property, wants_id, parent, ids) {
            append_common_refinements(&self.property, &id, seq, parent);
            if let Some(t) = &self.identifier_type {
                refine(parent, &id, "identifier-type", t, self.scheme.as_deref());
            }
        }
        Ok(())
    }
}

impl AppendEntry for Person {
    fn append_entry(
        &self,
        kind: PropertyKind,
        parent: &mut Element,
        ids: &mut IdAllocator,
        seq: Option<usize>,
    ) -> Result<(), EpubError> {
        let wants_id = self.property.has_refinements() || seq.is_some() || self.role.is_some();
        if let Some(id) = append_main(kind, &self.property, wants_id, parent, ids) {
            append_common_refinements(&self.property, &id, seq, parent);
            if let Some(role) = &self.role {
                refine(parent, &id, "role", role, self.role_scheme.as_deref());
            }
        }
        Ok(())
    }
}

impl AppendEntry for Source {
    fn append_entry(
        &self,
        kind: PropertyKind,
        parent: &mut Element,
        ids: &mut IdAllocator,
        seq: Option<usize>,
    ) -> Result<(), EpubError> {
        let wants_id = self.property.has_refinements() || seq.is_some() || self.source_of.is_some();
        if let Some(id) = append_main(kind, &self.property, wants_id, parent, ids) {
            append_common_refinements(&self.property, &id, seq, parent);
            if let Some(of) = &self.source_of {
                refine(parent, &id, "source-of", of, None);
            }
        }
        Ok(())
    }
}

fn resolve_id(
    property: &MetaProperty,
    prefix: &'static str,
    wants_id: bool,
    ids: &mut IdAllocator,
) -> Option<String> {
    match &property.id {
        Some(id) => {
            ids.claim(id);
            Some(id.clone())
        }
        None if wants_id => Some(ids.generate(prefix)),
        None => None,
    }
}

/// Push the main element; returns its id when it has (or was given) one.
fn append_main(
    kind: PropertyKind,
    property: &MetaProperty,
    wants_id: bool,
    parent: &mut Element,
    ids: &mut IdAllocator,
) -> Option<String> {
    let id = resolve_id(property, kind.id_prefix(), wants_id, ids);
    parent.push(
        Element::new(kind.tag())
            .with_opt_attr("id", id.as_deref())
            .with_text(property.value.render()),
    );
    id
}

fn append_common_refinements(
    property: &MetaProperty,
    id: &str,
    seq: Option<usize>,
    parent: &mut Element,
) {
    if let Some(alt) = &property.alternate_script {
        refine(parent, id, "alternate-script", alt, None);
    }
    if let Some(seq) = seq {
        refine(parent, id, "display-seq", &seq.to_string(), None);
    }
    if let Some(file_as) = &property.file_as {
        refine(parent, id, "file-as", file_as, None);
    }
    if let Some(auth) = &property.meta_authority {
        refine(parent, id, "meta-auth", auth, None);
    }
}

fn refine(parent: &mut Element, target: &str, property: &str, value: &str, scheme: Option<&str>) {
    parent.push(
        Element::new("meta")
            .with_attr("property", property)
            .with_attr("refines", format!("#{}", target))
            .with_opt_attr("scheme", scheme)
            .with_text(value),
    );
}

/// Serialize a list: a single entry gets no display-seq, several entries each get
/// their zero-based position.
fn append_list<T: AppendEntry>(
    kind: PropertyKind,
    entries: &[T],
    parent: &mut Element,
    ids: &mut IdAllocator,
) -> Result<(), EpubError> {
    let stamp = entries.len() > 1;
    for (i, entry) in entries.iter().enumerate() {
        entry.append_entry(kind, parent, ids, stamp.then_some(i))?;
    }
    Ok(())
}

/// Collections are `meta` elements rather than `dc:` ones, so they have their own list
/// helper. display-seq is stamped the same way as in [append_list].
fn append_collections(
    entries: &[Collection],
    parent: &mut Element,
    ids: &mut IdAllocator,
) -> Result<(), EpubError> {
    let stamp = entries.len() > 1;
    for (i, entry) in entries.iter().enumerate() {
        entry.append_collection(parent, ids, stamp.then_some(i), entry.refines_id.as_deref())?;
    }
    Ok(())
}

/// All metadata of one package document.
///
/// Lists are kept in insertion order. A fresh value holds one title, one identifier
/// and one language; emptying any of those lists makes serialization fail.
#[derive(Debug, Clone)]
pub struct MetaData {
    pub titles: Vec<Title>,
    pub creators: Vec<Person>,
    pub identifiers: Vec<Identifier>,
    pub contributors: Vec<Person>,
    pub coverages: Vec<MetaProperty>,
    pub dates: Vec<MetaProperty>,
    pub descriptions: Vec<MetaProperty>,
    pub formats: Vec<MetaProperty>,
    pub languages: Vec<MetaProperty>,
    pub publishers: Vec<MetaProperty>,
    pub relations: Vec<MetaProperty>,
    pub rights: Vec<MetaProperty>,
    pub sources: Vec<Source>,
    pub subjects: Vec<MetaProperty>,
    pub types: Vec<MetaProperty>,
    pub collections: Vec<Collection>,
    pub modified: DateTime<Utc>,
}

impl Default for MetaData {
    fn default() -> Self {
        Self {
            titles: vec![Title::new(DEFAULT_TITLE)],
            creators: Vec::new(),
            identifiers: vec![Identifier::new(
                MetaProperty::new(format!("urn:uuid:{}", uuid::Uuid::new_v4()))
                    .with_id(DEFAULT_IDENTIFIER_ID),
            )],
            contributors: Vec::new(),
            coverages: Vec::new(),
            dates: Vec::new(),
            descriptions: Vec::new(),
            formats: Vec::new(),
            languages: vec![MetaProperty::new(DEFAULT_LANGUAGE)],
            publishers: Vec::new(),
            relations: Vec::new(),
            rights: Vec::new(),
            sources: Vec::new(),
            subjects: Vec::new(),
            types: Vec::new(),
            collections: Vec::new(),
            modified: Utc::now(),
        }
    }
}

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of the first title.
    pub fn title(&self) -> Result<String, EpubError> {
        self.titles
            .first()
            .map(|t| t.property.value.render())
            .ok_or(EpubError::MissingMetadata { kind: "title" })
    }

    /// Replace the text of the first title, keeping its id and refinements.
    pub fn set_title(&mut self, title: impl Into<String>) {
        let title: String = title.into();
        match self.titles.first_mut() {
            Some(t) => t.property.value = PropertyValue::Text(title),
            None => self.titles.push(Title::new(title)),
        }
    }

    /// Value of the identifier whose id is `id`.
    pub fn identifier_value(&self, id: &str) -> Option<String> {
        self.identifiers
            .iter()
            .find(|i| i.property.id.as_deref() == Some(id))
            .map(|i| i.property.value.render())
    }

    /// Replace the value of the first identifier, keeping its id.
    pub fn set_identifier(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        match self.identifiers.first_mut() {
            Some(i) => i.property.value = PropertyValue::Text(value),
            None => self.identifiers.push(Identifier::new(
                MetaProperty::new(value).with_id(DEFAULT_IDENTIFIER_ID),
            )),
        }
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        let language: String = language.into();
        match self.languages.first_mut() {
            Some(l) => l.value = PropertyValue::Text(language),
            None => self.languages.push(MetaProperty::new(language)),
        }
    }

    /// Fail unless the required title, identifier and language are present.
    pub fn check_required(&self) -> Result<(), EpubError> {
        if self.titles.is_empty() {
            return Err(EpubError::MissingMetadata { kind: "title" });
        }
        if self.identifiers.is_empty() {
            return Err(EpubError::MissingMetadata { kind: "identifier" });
        }
        if self.languages.is_empty() {
            return Err(EpubError::MissingMetadata { kind: "language" });
        }
        Ok(())
    }

    /// Every explicitly set id, in document order.
    pub fn explicit_ids(&self) -> Vec<&str> {
        fn collection_ids<'a>(c: &'a Collection, out: &mut Vec<&'a str>) {
            out.extend(c.property.id.as_deref());
            if let Some(child) = &c.child {
                collection_ids(child, out);
            }
        }
        let mut out: Vec<&str> = Vec::new();
        out.extend(self.titles.iter().filter_map(|t| t.property.id.as_deref()));
        out.extend(self.creators.iter().filter_map(|p| p.property.id.as_deref()));
        out.extend(self.identifiers.iter().filter_map(|i| i.property.id.as_deref()));
        out.extend(self.contributors.iter().filter_map(|p| p.property.id.as_deref()));
        for list in [
            &self.coverages,
            &self.dates,
            &self.descriptions,
            &self.formats,
            &self.languages,
            &self.publishers,
            &self.relations,
            &self.rights,
        ] {
            out.extend(list.iter().filter_map(|p| p.id.as_deref()));
        }
        out.extend(self.sources.iter().filter_map(|s| s.property.id.as_deref()));
        out.extend(self.subjects.iter().filter_map(|p| p.id.as_deref()));
        out.extend(self.types.iter().filter_map(|p| p.id.as_deref()));
        for c in &self.collections {
            collection_ids(c, &mut out);
        }
        out
    }

    /// Append `<metadata>` to `parent`. Explicit ids are reserved in `ids` first.
    pub fn append_to(&self, parent: &mut Element, ids: &mut IdAllocator) -> Result<(), EpubError> {
        self.check_required()?;
        for id in self.explicit_ids() {
            ids.reserve(id)?;
        }
        let mut metadata = Element::new("metadata").with_attr("xmlns:dc", DC_NAMESPACE);
        append_list(PropertyKind::Title, &self.titles, &mut metadata, ids)?;
        append_list(PropertyKind::Creator, &self.creators, &mut metadata, ids)?;
        append_list(PropertyKind::Identifier, &self.identifiers, &mut metadata, ids)?;
        append_list(PropertyKind::Contributor, &self.contributors, &mut metadata, ids)?;
        append_list(PropertyKind::Coverage, &self.coverages, &mut metadata, ids)?;
        append_list(PropertyKind::Date, &self.dates, &mut metadata, ids)?;
        append_list(PropertyKind::Description, &self.descriptions, &mut metadata, ids)?;
        append_list(PropertyKind::Format, &self.formats, &mut metadata, ids)?;
        append_list(PropertyKind::Language, &self.languages, &mut metadata, ids)?;
        append_list(PropertyKind::Publisher, &self.publishers, &mut metadata, ids)?;
        append_list(PropertyKind::Relation, &self.relations, &mut metadata, ids)?;
        append_list(PropertyKind::Rights, &self.rights, &mut metadata, ids)?;
        append_list(PropertyKind::Source, &self.sources, &mut metadata, ids)?;
        append_list(PropertyKind::Subject, &self.subjects, &mut metadata, ids)?;
        append_list(PropertyKind::Type, &self.types, &mut metadata, ids)?;
        append_collections(&self.collections, &mut metadata, ids)?;
        metadata.push(
            Element::new("meta")
                .with_attr("property", "dcterms:modified")
                .with_text(self.modified.format(MODIFIED_FORMAT).to_string()),
        );
        parent.push(metadata);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use std::error::Error;

    fn render(f: impl FnOnce(&mut Element, &mut IdAllocator) -> Result<(), EpubError>) -> String {
        let mut parent = Element::new("metadata");
        let mut ids = IdAllocator::new();
        f(&mut parent, &mut ids).expect("serialize");
        parent.to_xml()
    }

    fn fixed_metadata() -> MetaData {
        MetaData {
            titles: vec![Title::new(MetaProperty::new("Test Title").with_id("title-id"))],
            identifiers: vec![Identifier::new(
                MetaProperty::new("identifier").with_id("identifier-id"),
            )],
            languages: vec![MetaProperty::new("en-US").with_id("language-id")],
            modified: Utc.with_ymd_and_hms(1987, 6, 5, 0, 0, 0).unwrap(),
            ..MetaData::default()
        }
    }

    #[test]
    fn property_without_id_has_no_refinements() {
        let xml = render(|p, ids| MetaProperty::new("Test").append_to(PropertyKind::Rights, p, ids));
        assert_eq!(xml, "<metadata><dc:rights>Test</dc:rights></metadata>");
    }

    #[test]
    fn property_with_id_only() {
        let prop = MetaProperty::new("John Doe").with_id("test-id");
        let xml = render(|p, ids| prop.append_to(PropertyKind::Coverage, p, ids));
        assert_eq!(
            xml,
            r#"<metadata><dc:coverage id="test-id">John Doe</dc:coverage></metadata>"#
        );
    }

    #[test]
    fn refinements_follow_fixed_order() {
        let prop = MetaProperty::new("Test Value")
            .with_id("test-id")
            .with_meta_authority("Test")
            .with_file_as("Value, Test")
            .with_display_seq(6)
            .with_alternate_script("Test Alt");
        let xml = render(|p, ids| prop.append_to(PropertyKind::Publisher, p, ids));
        assert_eq!(
            xml,
            concat!(
                r#"<metadata><dc:publisher id="test-id">Test Value</dc:publisher>"#,
                r##"<meta property="alternate-script" refines="#test-id">Test Alt</meta>"##,
                r##"<meta property="display-seq" refines="#test-id">6</meta>"##,
                r##"<meta property="file-as" refines="#test-id">Value, Test</meta>"##,
                r##"<meta property="meta-auth" refines="#test-id">Test</meta>"##,
                "</metadata>"
            )
        );
    }

    #[test]
    fn refinement_without_id_generates_one() {
        let person = Person::new(MetaProperty::new("J.C. McCrae").with_file_as("McCrae, J.C."))
            .with_role("aut", Some("marc:relators"));
        let xml = render(|p, ids| person.append_to(PropertyKind::Creator, p, ids));
        assert_eq!(
            xml,
            concat!(
                r#"<metadata><dc:creator id="creator-0">J.C. McCrae</dc:creator>"#,
                r##"<meta property="file-as" refines="#creator-0">McCrae, J.C.</meta>"##,
                r##"<meta property="role" refines="#creator-0" scheme="marc:relators">aut</meta>"##,
                "</metadata>"
            )
        );
    }

    #[test]
    fn generated_ids_skip_reserved_ones() -> Result<(), EpubError> {
        let mut ids = IdAllocator::new();
        ids.reserve("creator-0")?;
        assert_eq!(ids.generate("creator"), "creator-1");
        assert_eq!(ids.generate("creator"), "creator-2");
        assert!(matches!(
            ids.reserve("creator-1"),
            Err(EpubError::DuplicateId { .. })
        ));
        Ok(())
    }

    #[test]
    fn title_type_comes_before_other_refinements() {
        let title = Title::new(MetaProperty::new("Test Title").with_id("t").with_file_as("Title, Test"))
            .with_type("main");
        let xml = render(|p, ids| title.append_to(p, ids));
        assert_eq!(
            xml,
            concat!(
                r#"<metadata><dc:title id="t">Test Title</dc:title>"#,
                r##"<meta property="title-type" refines="#t">main</meta>"##,
                r##"<meta property="file-as" refines="#t">Title, Test</meta>"##,
                "</metadata>"
            )
        );
    }

    #[test]
    fn identifier_type_and_scheme() {
        let identifier = Identifier::new(MetaProperty::new("identifier").with_id("test-id"))
            .with_type("06", Some("onix:codelist5"));
        let xml = render(|p, ids| identifier.append_to(p, ids));
        assert_eq!(
            xml,
            concat!(
                r#"<metadata><dc:identifier id="test-id">identifier</dc:identifier>"#,
                r##"<meta property="identifier-type" refines="#test-id" scheme="onix:codelist5">06</meta>"##,
                "</metadata>"
            )
        );
    }

    #[test]
    fn date_value_renders_iso() {
        let date = NaiveDate::from_ymd_opt(1983, 11, 16)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date");
        let xml = render(|p, ids| MetaProperty::new(date).append_to(PropertyKind::Date, p, ids));
        assert_eq!(xml, "<metadata><dc:date>1983-11-16T00:00:00</dc:date></metadata>");
    }

    #[test]
    fn collection_basic_has_no_id() {
        let xml = render(|p, ids| Collection::new("Test Value").append_to(p, ids));
        assert_eq!(
            xml,
            r#"<metadata><meta property="belongs-to-collection">Test Value</meta></metadata>"#
        );
    }

    #[test]
    fn collection_refinements() {
        let c = Collection::new(MetaProperty::new("Parahumans").with_id("c"))
            .with_type("series")
            .with_group_position(2)
            .with_identifier("urn:x");
        let xml = render(|p, ids| c.append_to(p, ids));
        assert_eq!(
            xml,
            concat!(
                r#"<metadata><meta id="c" property="belongs-to-collection">Parahumans</meta>"#,
                r##"<meta property="collection-type" refines="#c">series</meta>"##,
                r##"<meta property="group-position" refines="#c">2</meta>"##,
                r##"<meta property="dcterms:identifier" refines="#c">urn:x</meta>"##,
                "</metadata>"
            )
        );
    }

    #[test]
    fn nested_collection_refines_parent() {
        let c = Collection::new(MetaProperty::new("Test Value").with_id("test-id")).with_child(
            Collection::new(MetaProperty::new("Other Value").with_id("other-id"))
                .with_identifier("identifier"),
        );
        let xml = render(|p, ids| c.append_to(p, ids));
        assert_eq!(
            xml,
            concat!(
                r#"<metadata><meta id="test-id" property="belongs-to-collection">Test Value</meta>"#,
                r##"<meta id="other-id" property="belongs-to-collection" refines="#test-id">Other Value</meta>"##,
                r##"<meta property="dcterms:identifier" refines="#other-id">identifier</meta>"##,
                "</metadata>"
            )
        );
    }

    #[test]
    fn collection_refines_id_is_emitted() {
        let mut c = Collection::new(MetaProperty::new("Test Value").with_id("test-id"));
        c.refines_id = Some("other-id".to_string());
        let xml = render(|p, ids| c.append_to(p, ids));
        assert_eq!(
            xml,
            r##"<metadata><meta id="test-id" property="belongs-to-collection" refines="#other-id">Test Value</meta></metadata>"##
        );
    }

    #[test]
    fn collection_list_stamps_display_seq_only_for_several() -> Result<(), EpubError> {
        let mut meta = fixed_metadata();
        meta.collections = vec![Collection::new("Worm")];
        let mut package = Element::new("package");
        meta.append_to(&mut package, &mut IdAllocator::new())?;
        let xml = package.to_xml();
        assert!(xml.contains(r#"<meta property="belongs-to-collection">Worm</meta><meta property="dcterms:modified">"#));

        meta.collections.push(Collection::new("Parahumans"));
        let mut package = Element::new("package");
        meta.append_to(&mut package, &mut IdAllocator::new())?;
        let xml = package.to_xml();
        assert!(xml.contains(concat!(
            r#"<meta id="collection-0" property="belongs-to-collection">Worm</meta>"#,
            r##"<meta property="display-seq" refines="#collection-0">0</meta>"##,
            r#"<meta id="collection-1" property="belongs-to-collection">Parahumans</meta>"#,
            r##"<meta property="display-seq" refines="#collection-1">1</meta>"##,
        )));
        Ok(())
    }

    #[test]
    fn metadata_basic_order() -> Result<(), EpubError> {
        let meta = fixed_metadata();
        let mut package = Element::new("package");
        meta.append_to(&mut package, &mut IdAllocator::new())?;
        assert_eq!(
            package.to_xml(),
            concat!(
                r#"<package><metadata xmlns:dc="http://purl.org/dc/elements/1.1/">"#,
                r#"<dc:title id="title-id">Test Title</dc:title>"#,
                r#"<dc:identifier id="identifier-id">identifier</dc:identifier>"#,
                r#"<dc:language id="language-id">en-US</dc:language>"#,
                r#"<meta property="dcterms:modified">1987-06-05T00:00:00Z</meta>"#,
                "</metadata></package>"
            )
        );
        Ok(())
    }

    #[test]
    fn singleton_list_gets_no_display_seq() -> Result<(), EpubError> {
        let mut meta = fixed_metadata();
        meta.contributors
            .push(Person::new(MetaProperty::new("Bob").with_id("contributor-id")).with_role("Illustrator", None));
        let mut package = Element::new("package");
        meta.append_to(&mut package, &mut IdAllocator::new())?;
        let xml = package.to_xml();
        assert!(!xml.contains("display-seq"));
        assert!(xml.contains(r##"<meta property="role" refines="#contributor-id">Illustrator</meta>"##));
        Ok(())
    }

    #[test]
    fn multiple_entries_get_positional_display_seq() -> Result<(), EpubError> {
        let mut meta = fixed_metadata();
        meta.contributors = ["Bob", "Jake", "Sue"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                // An explicit display_seq is overridden by list position.
                Person::new(
                    MetaProperty::new(*name)
                        .with_id(format!("contributor_{}", i))
                        .with_display_seq(99),
                )
            })
            .collect();
        let mut package = Element::new("package");
        meta.append_to(&mut package, &mut IdAllocator::new())?;
        let xml = package.to_xml();
        for i in 0..3 {
            let expected = format!(
                r##"<meta property="display-seq" refines="#contributor_{i}">{i}</meta>"##
            );
            assert!(xml.contains(&expected), "missing {}", expected);
        }
        assert!(!xml.contains(">99<"));
        Ok(())
    }

    #[test]
    fn multiple_entries_without_ids_get_generated_ids() -> Result<(), Box<dyn Error>> {
        let mut meta = fixed_metadata();
        meta.subjects = vec![MetaProperty::new("Fantasy"), MetaProperty::new("Horror")];
        let mut package = Element::new("package");
        meta.append_to(&mut package, &mut IdAllocator::new())?;
        let xml = package.to_xml();
        assert!(xml.contains(r#"<dc:subject id="subject-0">Fantasy</dc:subject>"#));
        assert!(xml.contains(r##"<meta property="display-seq" refines="#subject-1">1</meta>"##));
        Ok(())
    }

    #[test]
    fn text_is_escaped() -> Result<(), EpubError> {
        let mut meta = fixed_metadata();
        meta.titles = vec![Title::new("Dracula (Barnes & Noble Classics Series)")];
        let mut package = Element::new("package");
        meta.append_to(&mut package, &mut IdAllocator::new())?;
        assert!(package
            .to_xml()
            .contains("<dc:title>Dracula (Barnes &amp; Noble Classics Series)</dc:title>"));
        Ok(())
    }

    #[test]
    fn duplicate_explicit_ids_are_rejected() {
        let mut meta = fixed_metadata();
        meta.creators.push(Person::new(MetaProperty::new("A").with_id("title-id")));
        let result = meta.append_to(&mut Element::new("package"), &mut IdAllocator::new());
        assert!(matches!(result, Err(EpubError::DuplicateId { id }) if id == "title-id"));
    }

    #[test]
    fn cleared_required_list_is_an_error() {
        let mut meta = fixed_metadata();
        meta.identifiers.clear();
        let result = meta.append_to(&mut Element::new("package"), &mut IdAllocator::new());
        assert!(matches!(
            result,
            Err(EpubError::MissingMetadata { kind: "identifier" })
        ));
    }

    #[test]
    fn default_metadata_has_required_entries() -> Result<(), EpubError> {
        let meta = MetaData::default();
        meta.check_required()?;
        assert_eq!(meta.title()?, DEFAULT_TITLE);
        assert!(meta
            .identifier_value(DEFAULT_IDENTIFIER_ID)
            .is_some_and(|v| v.starts_with("urn:uuid:")));
        Ok(())
    }

    #[test]
    fn set_title_keeps_refinements() -> Result<(), EpubError> {
        let mut meta = fixed_metadata();
        meta.set_title("Ward");
        assert_eq!(meta.title()?, "Ward");
        assert_eq!(meta.titles[0].property.id.as_deref(), Some("title-id"));
        Ok(())
    }
}
