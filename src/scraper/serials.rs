//! Serials with a known starting chapter and metadata.

use crate::epub::{MetaData, MetaProperty, Person};
use crate::scraper::Site;

/// A serial that can be requested by name instead of URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownSerial {
    pub name: &'static str,
    pub title: &'static str,
    pub start_url: &'static str,
    pub site: Site,
    pub author: &'static str,
    pub author_file_as: &'static str,
    pub description: &'static str,
}

pub const KNOWN_SERIALS: [KnownSerial; 4] = [
    KnownSerial {
        name: "hpmor",
        title: "Harry Potter and the Methods of Rationality",
        start_url: "http://hpmor.com/chapter/1",
        site: Site::Hpmor,
        author: "Eliezer Yudkowsky",
        author_file_as: "Yudkowsky, Eliezer",
        description: "Petunia married a biochemist, and Harry grew up reading science and \
science fiction. Then came the Hogwarts letter, and a world of intriguing new possibilities \
to exploit.",
    },
    KnownSerial {
        name: "pact",
        title: "Pact",
        start_url: "https://pactwebserial.wordpress.com/2013/12/17/bonds-1-1/",
        site: Site::Wildbow,
        author: "J.C. McCrae",
        author_file_as: "McCrae, J.C.",
        description: "Blake Thorburn was driven away from home and family by a vicious fight \
over inheritance, returning only for a deathbed visit with the grandmother who set it in motion.",
    },
    KnownSerial {
        name: "twig",
        title: "Twig",
        start_url: "https://twigserial.wordpress.com/2014/12/24/taking-root-1-1/",
        site: Site::Wildbow,
        author: "J.C. McCrae",
        author_file_as: "McCrae, J.C.",
        description: "The year is 1921, and a little over a century has passed since a great \
mind unraveled the underpinnings of life itself.",
    },
    KnownSerial {
        name: "ward",
        title: "Ward",
        start_url: "https://www.parahumans.net/2017/10/21/glow-worm-0-1/",
        site: Site::Wildbow,
        author: "J.C. McCrae",
        author_file_as: "McCrae, J.C.",
        description: "The unwritten rules that govern the fights and outright wars between \
'capes' have been amended: everyone gets their second chance.",
    },
];

/// Look up a serial by name, case-insensitively.
pub fn find_serial(name: &str) -> Option<&'static KnownSerial> {
    KNOWN_SERIALS
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
}

impl KnownSerial {
    /// Set title, author (role `aut`) and description on `metadata`.
    pub fn apply(&self, metadata: &mut MetaData) {
        metadata.set_title(self.title);
        metadata.creators.push(
            Person::new(MetaProperty::new(self.author).with_file_as(self.author_file_as))
                .with_role("aut", Some("marc:relators")),
        );
        metadata.descriptions.push(MetaProperty::new(self.description));
    }
}
