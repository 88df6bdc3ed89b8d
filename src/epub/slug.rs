//! Filename derivation for chapters and archives.

/// Longest slug in bytes. Keeps `chapter_NNN_<slug>.xhtml` well under the usual
/// 255-byte filename limit.
pub const MAX_SLUG_BYTES: usize = 200;

/// Chapter filename slug: every non-word character becomes `_`.
///
/// Word characters are Unicode letters, digits and `_`, so the same title always
/// yields the same slug. Long slugs are cut at a character boundary to at most
/// [MAX_SLUG_BYTES].
pub fn chapter_slug(title: &str) -> String {
    let mut slug = String::new();
    for c in title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
    {
        if slug.len() + c.len_utf8() > MAX_SLUG_BYTES {
            break;
        }
        slug.push(c);
    }
    slug
}

/// Archive file stem: lowercase ASCII alphanumerics joined by single dashes, at most
/// [MAX_SLUG_BYTES] long.
pub fn file_stem(title: &str) -> String {
    let mut s = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>();
    while s.contains("--") {
        s = s.replace("--", "-");
    }
    s.truncate(MAX_SLUG_BYTES);
    s = s.trim_matches('-').to_string();
    if s.is_empty() {
        s = "book".to_string();
    }
    s
}
