//! Markup extraction for album, song and artist pages.
//!
//! Pages are decoded once with [`decode_entities`] and then matched with
//! fixed patterns. Nothing here performs I/O.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,6});"));
static A_TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?is)<a\s+[^>]*>"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
});
static ARTIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(concat!(
        r"<td>Исполнитель:</td>\s*<td>\s*",
        r"<a [^>]*>\s*",
        r#"<meta [^>]*itemprop="url"[^>]*/>\s*"#,
        r#"<meta [^>]*itemprop="name"[^>]*/>\s*"#,
        r"(.+?)\s*</a>",
    ))
});
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(concat!(
        r#"<span itemprop="title">.+?</span>\s*</a>/\s*"#,
        r#"<span [^>]*itemtype="http://data-vocabulary.org/Breadcrumb"[^>]*>(.+?)</span>"#,
    ))
});
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"<time datetime="(\d+)[^"]*" itemprop="datePublished">"#)
});
static COVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"<img alt="[^"]+" itemprop="image" src="([^"]+)"\s*/?>"#)
});
static POSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(concat!(
        r#"(?i)<div class="position">\s*(\d+)\s*</div>\s*"#,
        r#"<div class="options">\s*<div class="top">\s*"#,
        r#"<span [^\n]+?title="Сохранить в плейлист"[^\n]*?></span>\s*"#,
        r#"<span [^\n]+?title="Добавить в плеер"[^\n]*?>[^\n]*?</span>\s*"#,
        r#"<a href="([^"]+)""#,
    ))
});
static ABSENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(concat!(
        r#"<div class="position">\s*(\d+)\s*</div>\s*"#,
        r#"<div class="options">\s*<div class="top">\s*"#,
        r#"<span class="[^"]*glyphicon-ban-circle[^"]*"></span>\s*</div>\s*"#,
        r#"<div class="data">.+?</div>\s*</div>\s*"#,
        r#"<div class="details">\s*<div class="time">.+?</div>\s*"#,
        r"<a .+?\s*<meta .+?\s*<meta .+?\s*</span>\s*<p>\s*",
        r"<span>(.+?)</span> <span class=.+?>\[Удален по требованию правообладателя\]</span>",
    ))
});

const SONG_PATH_PREFIX: &str = "/Song/";
const DOWNLOAD_TITLE_PREFIX: &str = "Скачать";
const ALBUM_PATH_MARKER: &str = "/Album/";

/// Album fields recovered from the page. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialMetadata {
    /// Performing artist.
    pub artist: Option<String>,
    /// Album title.
    pub title: Option<String>,
    /// Release year as printed on the page.
    pub year: Option<String>,
}

/// Link to a song page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLink {
    /// Position on the album, when the page shows one.
    pub number: Option<u32>,
    /// Absolute URL of the song page.
    pub page_url: String,
}

impl TrackLink {
    /// Two-digit position, `00` when unknown.
    #[must_use]
    pub fn padded_number(&self) -> String {
        format!("{:02}", self.number.unwrap_or(0))
    }
}

/// Track listed on the album but removed from the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsentTrack {
    /// Position on the album.
    pub number: u32,
    /// Track title.
    pub title: String,
}

/// Everything extracted from one album page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumPage {
    /// Artist, title and year.
    pub metadata: PartialMetadata,
    /// Absolute cover image URL.
    pub cover_url: Option<String>,
    /// Downloadable tracks in page order.
    pub tracks: Vec<TrackLink>,
    /// Tracks the site no longer serves.
    pub absent_tracks: Vec<AbsentTrack>,
}

/// Returns `scheme://host[:port]` of `page_url`.
#[must_use]
pub fn base_url(page_url: &Url) -> String {
    page_url.origin().ascii_serialization()
}

/// Decodes character references: the common named ones and all numeric forms.
/// Unknown names are left untouched.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{00a0}'),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        _ => None,
    }
}

/// Parses a decoded album page.
#[must_use]
pub fn parse_album_page(html: &str, page_url: &Url) -> AlbumPage {
    let metadata = PartialMetadata {
        artist: first_capture(&ARTIST_RE, html),
        title: first_capture(&TITLE_RE, html),
        year: first_capture(&YEAR_RE, html),
    };
    let cover_url = first_capture(&COVER_RE, html).and_then(|src| absolutize(&src, page_url));

    let positions: HashMap<&str, u32> = POSITION_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let number = caps.get(1)?.as_str().parse().ok()?;
            Some((caps.get(2)?.as_str(), number))
        })
        .collect();

    let tracks = anchor_tags(html)
        .into_iter()
        .filter(|attrs| {
            attr(attrs, "title").is_some_and(|t| t.starts_with(DOWNLOAD_TITLE_PREFIX))
        })
        .filter_map(|attrs| {
            let href = attr(&attrs, "href")?;
            if !href.starts_with(SONG_PATH_PREFIX) {
                return None;
            }
            Some(TrackLink {
                number: positions.get(href).copied(),
                page_url: absolutize(href, page_url)?,
            })
        })
        .collect();

    let absent_tracks = ABSENT_RE
        .captures_iter(html)
        .filter_map(|caps| {
            Some(AbsentTrack {
                number: caps.get(1)?.as_str().parse().ok()?,
                title: caps.get(2)?.as_str().trim().to_string(),
            })
        })
        .collect();

    AlbumPage {
        metadata,
        cover_url,
        tracks,
        absent_tracks,
    }
}

/// Returns the absolute file URL linked from a decoded song page.
#[must_use]
pub fn parse_song_page(html: &str, page_url: &Url) -> Option<String> {
    anchor_tags(html)
        .into_iter()
        .find(|attrs| {
            attr(attrs, "class").is_some_and(|c| c.split_whitespace().any(|c| c == "no-ajaxy"))
                && attr(attrs, "itemprop") == Some("audio")
                && attr(attrs, "href").is_some_and(|h| !h.is_empty())
        })
        .and_then(|attrs| absolutize(attr(&attrs, "href")?, page_url))
}

/// Returns the album URLs linked from a decoded artist page, de-duplicated in
/// page order.
#[must_use]
pub fn parse_artist_page(html: &str, page_url: &Url) -> Vec<String> {
    let mut albums: Vec<String> = Vec::new();
    for attrs in anchor_tags(html) {
        let Some(href) = attr(&attrs, "href") else {
            continue;
        };
        if !href.contains(ALBUM_PATH_MARKER) {
            continue;
        }
        if let Some(url) = absolutize(href, page_url)
            && !albums.contains(&url)
        {
            albums.push(url);
        }
    }
    albums
}

fn first_capture(regex: &Regex, html: &str) -> Option<String> {
    regex
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn absolutize(href: &str, page_url: &Url) -> Option<String> {
    if href.starts_with('/') && !href.starts_with("//") {
        return Some(format!("{}{href}", base_url(page_url)));
    }
    page_url.join(href).ok().map(String::from)
}

type Attributes<'a> = Vec<(String, &'a str)>;

fn anchor_tags(html: &str) -> Vec<Attributes<'_>> {
    A_TAG_RE
        .find_iter(html)
        .map(|tag| {
            ATTR_RE
                .captures_iter(tag.as_str())
                .filter_map(|caps| {
                    let key = caps.get(1)?.as_str().to_ascii_lowercase();
                    let value = caps.get(2).or_else(|| caps.get(3))?.as_str();
                    Some((key, value))
                })
                .collect()
        })
        .collect()
}

fn attr<'a>(attrs: &[(String, &'a str)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| *value)
}
