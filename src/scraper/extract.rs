//! Per-site extraction rules: where the title, the chapter body and the next link are.
//!
//! Parsed HTML is converted into the crate's own [Node] tree so chapters own their
//! content independently of the page they came from.

use crate::epub::SourcedChapter;
use crate::scraper::{parse_selector, ScraperError, Site};
use crate::xml::{xml_chars, Element, Node};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

/// Text of the link to the following chapter.
const NEXT_LINK_PATTERN: &str = "Next";
/// Text of the navigation paragraphs that frame a chapter body.
const NAV_PARAGRAPH_PATTERN: &str = "(Last|Next|Previous)";
/// Elements never copied into a chapter.
const DROPPED_ELEMENTS: [&str; 2] = ["script", "noscript"];

/// Which children of the content container make up the chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    /// Every child.
    AllChildren,
    /// Siblings after the first navigation paragraph, up to the next navigation
    /// paragraph. Falls back to every child when there is no navigation paragraph.
    BetweenNavLinks,
}

/// One chapter page, extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub chapter: SourcedChapter,
    /// Absolute URL of the next chapter, if the page links to one.
    pub next_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractionRules {
    title: Selector,
    content: Selector,
    mode: ContentMode,
    next_link: Regex,
    nav_paragraph: Regex,
}

impl ExtractionRules {
    pub fn new(title_selector: &str, content_selector: &str, mode: ContentMode) -> Result<Self, ScraperError> {
        Ok(Self {
            title: parse_selector(title_selector)?,
            content: parse_selector(content_selector)?,
            mode,
            next_link: compile(NEXT_LINK_PATTERN)?,
            nav_paragraph: compile(NAV_PARAGRAPH_PATTERN)?,
        })
    }

    /// Preset rules for a supported site.
    pub fn for_site(site: Site) -> Result<Self, ScraperError> {
        match site {
            Site::Hpmor => Self::new("div#chapter-title", "#storycontent", ContentMode::AllChildren),
            Site::Wildbow => Self::new("h1.entry-title", "div.entry-content", ContentMode::BetweenNavLinks),
        }
    }

    pub fn with_title_selector(mut self, selector: &str) -> Result<Self, ScraperError> {
        self.title = parse_selector(selector)?;
        Ok(self)
    }

    pub fn with_content_selector(mut self, selector: &str) -> Result<Self, ScraperError> {
        self.content = parse_selector(selector)?;
        Ok(self)
    }

    pub fn mode(&self) -> ContentMode {
        self.mode
    }

    /// Extract title, body and next link from the page at `page_url`.
    pub fn extract(&self, html: &str, page_url: &Url) -> Result<ExtractedPage, ScraperError> {
        let doc = Html::parse_document(html);
        let title = doc
            .select(&self.title)
            .next()
            .map(|el| clean_title(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ScraperError::MissingTitle {
                url: page_url.to_string(),
            })?;
        let container = doc
            .select(&self.content)
            .next()
            .ok_or_else(|| ScraperError::MissingContent {
                url: page_url.to_string(),
            })?;
        let content = match self.mode {
            ContentMode::AllChildren => all_children(container),
            ContentMode::BetweenNavLinks => self.between_nav_links(container),
        };
        let next_url = self.next_url(&doc, page_url)?;
        Ok(ExtractedPage {
            chapter: SourcedChapter { title, content },
            next_url,
        })
    }

    fn between_nav_links(&self, container: ElementRef<'_>) -> Vec<Node> {
        let start = container
            .descendants()
            .find(|n| matches!(n.value(), scraper::Node::Text(t) if self.nav_paragraph.is_match(t)))
            .and_then(|text| {
                text.ancestors()
                    .take_while(|a| *a != *container)
                    .filter_map(ElementRef::wrap)
                    .find(|el| el.value().name() == "p")
            });
        let Some(start) = start else {
            return all_children(container);
        };
        let mut out = Vec::new();
        for sibling in start.next_siblings() {
            if let Some(el) = ElementRef::wrap(sibling) {
                if self.is_nav_paragraph(el) {
                    break;
                }
            }
            convert(sibling.value(), ElementRef::wrap(sibling), &mut out);
        }
        out.retain(|node| !node.is_blank());
        out
    }

    fn is_nav_paragraph(&self, el: ElementRef<'_>) -> bool {
        let has_link = el
            .descendants()
            .filter_map(ElementRef::wrap)
            .any(|d| d.value().name() == "a");
        has_link && el.text().any(|t| self.nav_paragraph.is_match(t))
    }

    fn next_url(&self, doc: &Html, page_url: &Url) -> Result<Option<String>, ScraperError> {
        let anchors = parse_selector("a[href]")?;
        let href = doc
            .select(&anchors)
            .find(|a| self.next_link.is_match(&a.text().collect::<String>()))
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|h| !h.is_empty());
        let Some(href) = href else {
            return Ok(None);
        };
        let next = page_url.join(href).map_err(|e| ScraperError::InvalidLink {
            href: href.to_string(),
            url: page_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(next.to_string()))
    }
}

fn compile(pattern: &str) -> Result<Regex, ScraperError> {
    Regex::new(pattern).map_err(|e| ScraperError::InvalidSelector {
        selector: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Newlines become spaces; surrounding whitespace is dropped.
fn clean_title(raw: &str) -> String {
    raw.replace('\n', " ").trim().to_string()
}

fn all_children(container: ElementRef<'_>) -> Vec<Node> {
    let mut out = Vec::new();
    for child in container.children() {
        convert(child.value(), ElementRef::wrap(child), &mut out);
    }
    out.retain(|node| !node.is_blank());
    out
}

/// Convert one parsed node into `out`. Comments, doctypes and dropped elements add
/// nothing. Elements whose name is not a plain XML name (e.g. Word's `o:p`) are
/// unwrapped: their children are kept in their place.
fn convert(value: &scraper::Node, element: Option<ElementRef<'_>>, out: &mut Vec<Node>) {
    match (value, element) {
        (scraper::Node::Text(t), _) => out.push(Node::text(xml_chars(t).into_owned())),
        (_, Some(el)) => convert_element(el, out),
        _ => {}
    }
}

fn convert_element(el: ElementRef<'_>, out: &mut Vec<Node>) {
    let name = el.value().name();
    if DROPPED_ELEMENTS.contains(&name) {
        return;
    }
    if !is_xml_name(name) {
        tracing::debug!(element = name, "unwrapping element with a non-XML name");
        for child in el.children() {
            convert(child.value(), ElementRef::wrap(child), out);
        }
        return;
    }
    let mut converted = Element::new(name);
    for (attr, value) in el.value().attrs() {
        if is_xml_attribute(attr) {
            converted.set_attr(attr, value);
        }
    }
    for child in el.children() {
        convert(child.value(), ElementRef::wrap(child), &mut converted.children);
    }
    out.push(Node::Element(converted));
}

/// Conservative check for unprefixed names that are safe to emit in XML.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Plain names, plus the predeclared `xml:` prefix. Namespace declarations and other
/// prefixes would be unbound or rebind the XHTML namespace.
fn is_xml_attribute(name: &str) -> bool {
    match name.strip_prefix("xml:") {
        Some(local) => is_xml_name(local),
        None => is_xml_name(name) && name != "xmlns",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    const HPMOR_PAGE: &str = r#"<html><body>
        <div id="chapter-title">Chapter 1: A Day of
Very Low Probability</div>
        <div id="storycontent">
          <p>Beneath the moonlight glints a tiny fragment of silver &amp; gold.</p>
          <script>track();</script>
          <p><em>Petunia</em> wed Michael.</p>
        </div>
        <div class="nav"><a href="/chapter/2">Next &gt;</a></div>
    </body></html>"#;

    const WILDBOW_PAGE: &str = r#"<html><body>
        <h1 class="entry-title">Bonds 1.1</h1>
        <div class="entry-content">
          <p><a href="/prev">Last Chapter</a> <a href="../1-2/">Next Chapter</a></p>
          <p>First line.</p>
          <p>Second line.</p>
          <p><a href="/prev">Last Chapter</a> <a href="../1-2/">Next Chapter</a></p>
          <div class="sharedaddy">Share this</div>
        </div>
    </body></html>"#;

    fn url(s: &str) -> Result<Url, Box<dyn Error>> {
        Ok(Url::parse(s)?)
    }

    #[test]
    fn hpmor_rules_take_all_children() -> Result<(), Box<dyn Error>> {
        let rules = ExtractionRules::for_site(Site::Hpmor)?;
        let page = rules.extract(HPMOR_PAGE, &url("http://hpmor.com/chapter/1")?)?;
        assert_eq!(page.chapter.title, "Chapter 1: A Day of Very Low Probability");
        let names: Vec<&str> = page
            .chapter
            .content
            .iter()
            .filter_map(Node::as_element)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["p", "p"]);
        assert!(page.chapter.content.iter().all(|n| !n.is_blank()));
        assert_eq!(
            page.chapter.content[0].to_xml(),
            "<p>Beneath the moonlight glints a tiny fragment of silver &amp; gold.</p>"
        );
        assert_eq!(page.next_url.as_deref(), Some("http://hpmor.com/chapter/2"));
        Ok(())
    }

    #[test]
    fn wildbow_rules_stop_at_second_nav_paragraph() -> Result<(), Box<dyn Error>> {
        let rules = ExtractionRules::for_site(Site::Wildbow)?;
        let page = rules.extract(
            WILDBOW_PAGE,
            &url("https://pactwebserial.wordpress.com/2013/12/17/bonds-1-1/")?,
        )?;
        let texts: Vec<String> = page.chapter.content.iter().map(Node::text_content).collect();
        assert_eq!(texts, vec!["First line.", "Second line."]);
        assert_eq!(
            page.next_url.as_deref(),
            Some("https://pactwebserial.wordpress.com/2013/12/17/1-2/")
        );
        Ok(())
    }

    #[test]
    fn wildbow_without_nav_paragraph_takes_everything() -> Result<(), Box<dyn Error>> {
        let html = r#"<h1 class="entry-title">Interlude</h1>
            <div class="entry-content"><p>Only text.</p><p>More.</p></div>"#;
        let rules = ExtractionRules::for_site(Site::Wildbow)?;
        let page = rules.extract(html, &url("https://www.parahumans.net/x/")?)?;
        assert_eq!(page.chapter.content.len(), 2);
        assert_eq!(page.next_url, None);
        Ok(())
    }

    #[test]
    fn missing_title_and_content_are_errors() -> Result<(), Box<dyn Error>> {
        let rules = ExtractionRules::for_site(Site::Hpmor)?;
        let page_url = url("http://hpmor.com/chapter/9")?;
        assert!(matches!(
            rules.extract("<div id='storycontent'><p>x</p></div>", &page_url),
            Err(ScraperError::MissingTitle { .. })
        ));
        assert!(matches!(
            rules.extract("<div id='chapter-title'>T</div>", &page_url),
            Err(ScraperError::MissingContent { .. })
        ));
        Ok(())
    }

    #[test]
    fn custom_selectors_override_preset() -> Result<(), Box<dyn Error>> {
        let rules = ExtractionRules::for_site(Site::Hpmor)?
            .with_title_selector("h2.t")?
            .with_content_selector("article")?;
        let html = r#"<h2 class="t">Custom</h2><article><p>Body</p></article>"#;
        let page = rules.extract(html, &url("https://example.com/1")?)?;
        assert_eq!(page.chapter.title, "Custom");
        assert_eq!(page.chapter.content.len(), 1);
        Ok(())
    }

    #[test]
    fn invalid_selector_is_reported() {
        assert!(matches!(
            ExtractionRules::new("h1[", "div", ContentMode::AllChildren),
            Err(ScraperError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn converted_content_is_well_formed() -> Result<(), Box<dyn Error>> {
        let html = r#"<h1 class="entry-title">T</h1><div class="entry-content">
            <p>Line<br>break &lt;tag&gt; <img src="a.png" alt="x"></p>
            <p 1bad="x" onclick="y()">attrs</p></div>"#;
        let rules = ExtractionRules::for_site(Site::Wildbow)?;
        let page = rules.extract(html, &url("https://www.parahumans.net/x/")?)?;
        let mut body = Element::new("body");
        for node in page.chapter.content {
            body.push(node);
        }
        let xml = body.to_xml();
        crate::xml::assert_well_formed(&xml)?;
        assert!(xml.contains("<br/>"));
        assert!(xml.contains(r#"<p onclick="y()">attrs</p>"#));
        Ok(())
    }

    #[test]
    fn xml_name_check() {
        assert!(is_xml_name("class"));
        assert!(is_xml_name("data-x"));
        assert!(!is_xml_name("o:p"));
        assert!(!is_xml_name("1x"));
        assert!(!is_xml_name("a\"b"));
        assert!(!is_xml_name(""));
        assert!(is_xml_attribute("xml:lang"));
        assert!(!is_xml_attribute("xmlns"));
        assert!(!is_xml_attribute("xmlns:o"));
        assert!(!is_xml_attribute("v:shape"));
    }

    #[test]
    fn word_markup_and_control_characters_become_valid_xhtml() -> Result<(), Box<dyn Error>> {
        let html = "<div id=\"chapter-title\">Pasted</div><div id=\"storycontent\">\
            <p>Word paste<o:p></o:p></p><p>bell\u{8}here</p>\
            <p class=\"MsoNormal\" xmlns:o=\"urn:o\" lang=\"en\" xml:lang=\"en\" v:ext=\"edit\">\
            <o:wrap><em>kept</em></o:wrap></p></div>";
        let rules = ExtractionRules::for_site(Site::Hpmor)?;
        let page = rules.extract(html, &url("http://hpmor.com/chapter/3")?)?;
        let content = &page.chapter.content;
        assert_eq!(content[0].to_xml(), "<p>Word paste</p>");
        assert_eq!(content[1].to_xml(), "<p>bellhere</p>");
        let styled = content[2].as_element().ok_or("expected an element")?;
        let mut names: Vec<&str> = styled.attributes.iter().map(|(k, _)| k.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["class", "lang", "xml:lang"]);
        assert_eq!(styled.children, vec![Node::Element(Element::new("em").with_text("kept"))]);

        let chapter = crate::epub::Chapter::content(1, page.chapter);
        crate::xml::assert_well_formed(&chapter.create_document().to_xml())?;
        Ok(())
    }
}
