//! Chapter source that follows "Next" links from a starting page.

use crate::epub::{ChapterSource, SourceError, SourcedChapter};
use crate::scraper::extract::{ExtractedPage, ExtractionRules};
use crate::scraper::{PoliteClient, ScraperError};
use reqwest::Url;
use std::collections::HashSet;

/// Called with the chapter number and title after each page is extracted.
pub type ChapterCallback = Box<dyn FnMut(usize, &str)>;

/// Returns the HTML body of a chapter page.
pub trait PageFetcher {
    fn fetch_page(&mut self, url: &str) -> Result<String, ScraperError>;
}

impl PageFetcher for PoliteClient {
    fn fetch_page(&mut self, url: &str) -> Result<String, ScraperError> {
        self.fetch_text(url)
    }
}

/// Fetches one page per chapter. The sequence ends when a page has no next link,
/// or its next link points at a page already visited.
pub struct WebChapterSource<F = PoliteClient> {
    fetcher: F,
    rules: ExtractionRules,
    next_url: Option<String>,
    visited: HashSet<String>,
    fetched: usize,
    on_chapter: Option<ChapterCallback>,
}

impl<F: PageFetcher> WebChapterSource<F> {
    pub fn new(fetcher: F, rules: ExtractionRules, start_url: &str) -> Result<Self, ScraperError> {
        let start = parse_url(start_url)?;
        Ok(Self {
            fetcher,
            rules,
            next_url: Some(start.to_string()),
            visited: HashSet::new(),
            fetched: 0,
            on_chapter: None,
        })
    }

    pub fn on_chapter(mut self, callback: impl FnMut(usize, &str) + 'static) -> Self {
        self.on_chapter = Some(Box::new(callback));
        self
    }

    /// Number of chapters fetched so far.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    fn fetch_page(&mut self, url: &str) -> Result<ExtractedPage, ScraperError> {
        let page_url = parse_url(url)?;
        tracing::debug!(url, "fetching chapter page");
        let html = self.fetcher.fetch_page(url)?;
        self.rules.extract(&html, &page_url)
    }
}

impl<F: PageFetcher> ChapterSource for WebChapterSource<F> {
    fn next_chapter(&mut self) -> Result<Option<SourcedChapter>, SourceError> {
        let Some(url) = self.next_url.take() else {
            return Ok(None);
        };
        self.visited.insert(url.clone());
        let page = self.fetch_page(&url)?;
        self.fetched += 1;
        tracing::info!(number = self.fetched, title = %page.chapter.title, url = %url, "fetched chapter");
        if let Some(callback) = self.on_chapter.as_mut() {
            callback(self.fetched, &page.chapter.title);
        }
        self.next_url = match page.next_url {
            Some(next) if self.visited.contains(&next) => {
                tracing::warn!(url = %next, "next link points at a visited page; stopping");
                None
            }
            other => other,
        };
        Ok(Some(page.chapter))
    }
}

fn parse_url(input: &str) -> Result<Url, ScraperError> {
    Url::parse(input).map_err(|e| ScraperError::InvalidUrl {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::Site;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::error::Error;
    use std::rc::Rc;

    /// Serves canned pages by URL and records every request.
    struct CannedPages {
        pages: HashMap<String, String>,
        requested: Rc<RefCell<Vec<String>>>,
    }

    impl CannedPages {
        fn new(pages: &[(&str, String)]) -> Self {
            Self {
                pages: pages.iter().map(|(u, h)| (u.to_string(), h.clone())).collect(),
                requested: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    impl PageFetcher for CannedPages {
        fn fetch_page(&mut self, url: &str) -> Result<String, ScraperError> {
            self.requested.borrow_mut().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| ScraperError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    fn hpmor_page(title: &str, next: Option<&str>) -> String {
        let link = next
            .map(|href| format!(r#"<a href="{}">Next &gt;</a>"#, href))
            .unwrap_or_default();
        format!(
            r#"<div id="chapter-title">{}</div><div id="storycontent"><p>Text of {}</p></div>{}"#,
            title, title, link
        )
    }

    #[test]
    fn invalid_start_url_is_rejected() -> Result<(), Box<dyn Error>> {
        let client = PoliteClient::builder().delay_secs(0).build()?;
        let rules = ExtractionRules::for_site(Site::Hpmor)?;
        let result = WebChapterSource::new(client, rules, "not a url");
        assert!(matches!(result, Err(ScraperError::InvalidUrl { .. })));
        Ok(())
    }

    #[test]
    fn starts_with_no_chapters_fetched() -> Result<(), Box<dyn Error>> {
        let client = PoliteClient::builder().delay_secs(0).build()?;
        let rules = ExtractionRules::for_site(Site::Wildbow)?;
        let source = WebChapterSource::new(client, rules, "https://www.parahumans.net/2017/10/21/glow-worm-0-1/")?;
        assert_eq!(source.fetched(), 0);
        assert_eq!(
            source.next_url.as_deref(),
            Some("https://www.parahumans.net/2017/10/21/glow-worm-0-1/")
        );
        Ok(())
    }

    #[test]
    fn follows_next_links_until_a_page_repeats() -> Result<(), SourceError> {
        let pages = CannedPages::new(&[
            ("http://hpmor.com/chapter/1", hpmor_page("One", Some("/chapter/2"))),
            ("http://hpmor.com/chapter/2", hpmor_page("Two", Some("3"))),
            ("http://hpmor.com/chapter/3", hpmor_page("Three", Some("/chapter/1"))),
        ]);
        let requested = Rc::clone(&pages.requested);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in_callback = Rc::clone(&seen);
        let mut source = WebChapterSource::new(
            pages,
            ExtractionRules::for_site(Site::Hpmor)?,
            "http://hpmor.com/chapter/1",
        )?
        .on_chapter(move |n, title| seen_in_callback.borrow_mut().push((n, title.to_string())));

        let mut titles = Vec::new();
        while let Some(chapter) = source.next_chapter()? {
            titles.push(chapter.title);
        }
        assert_eq!(titles, vec!["One", "Two", "Three"]);
        assert_eq!(source.fetched(), 3);
        assert_eq!(
            *seen.borrow(),
            vec![(1, "One".to_string()), (2, "Two".to_string()), (3, "Three".to_string())]
        );
        assert_eq!(
            *requested.borrow(),
            vec![
                "http://hpmor.com/chapter/1",
                "http://hpmor.com/chapter/2",
                "http://hpmor.com/chapter/3",
            ]
        );
        assert!(source.next_chapter()?.is_none());
        assert_eq!(requested.borrow().len(), 3);
        Ok(())
    }

    #[test]
    fn page_without_next_link_ends_the_sequence() -> Result<(), SourceError> {
        let pages = CannedPages::new(&[("http://hpmor.com/chapter/1", hpmor_page("Only", None))]);
        let mut source = WebChapterSource::new(
            pages,
            ExtractionRules::for_site(Site::Hpmor)?,
            "http://hpmor.com/chapter/1",
        )?;
        assert_eq!(source.next_chapter()?.map(|c| c.title).as_deref(), Some("Only"));
        assert!(source.next_chapter()?.is_none());
        Ok(())
    }

    #[test]
    fn fetch_failure_is_a_source_error() -> Result<(), SourceError> {
        let pages = CannedPages::new(&[("http://hpmor.com/chapter/1", hpmor_page("One", Some("/chapter/2")))]);
        let mut source = WebChapterSource::new(
            pages,
            ExtractionRules::for_site(Site::Hpmor)?,
            "http://hpmor.com/chapter/1",
        )?;
        assert!(source.next_chapter()?.is_some());
        let err = source.next_chapter().err().ok_or("expected an error")?;
        assert!(matches!(
            err.downcast_ref::<ScraperError>(),
            Some(ScraperError::HttpStatus { status: 404, .. })
        ));
        Ok(())
    }
}
