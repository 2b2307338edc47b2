//! Media types and content negotiation.
//!
//! A [`MediaType`] is the parsed form of `type/subtype;name=value`. Two media
//! types are equal when their `type/subtype` is equal; parameters such as `q`
//! or `charset` never take part in equality.
//!
//! ```rust
//! use weft::MediaType;
//!
//! assert!(MediaType::matches("text/*", "text/html"));
//! assert!(MediaType::matches("application/*+json", "application/vnd.api+json"));
//! assert!(!MediaType::matches("text/html", "text/plain"));
//!
//! let produces = [MediaType::JSON, MediaType::HTML];
//! let chosen = MediaType::accept(&produces, Some("text/html;q=0.9, */*;q=0.1"));
//! assert_eq!(chosen, Some(MediaType::HTML));
//! ```

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use http::StatusCode;

use crate::error::Error;

/// An immutable `type/subtype[;params]` value.
#[derive(Clone, Debug)]
pub struct MediaType {
    /// Lower-cased `type/subtype`, without parameters.
    value: Cow<'static, str>,
    /// Byte offset of the `/` separator inside `value`.
    slash: usize,
    params: Vec<(String, String)>,
}

impl MediaType {
    pub const ALL: MediaType = MediaType::constant("*/*", 1);
    pub const JSON: MediaType = MediaType::constant("application/json", 11);
    pub const XML: MediaType = MediaType::constant("application/xml", 11);
    pub const JAVASCRIPT: MediaType = MediaType::constant("application/javascript", 11);
    pub const OCTET_STREAM: MediaType = MediaType::constant("application/octet-stream", 11);
    pub const FORM_URLENCODED: MediaType =
        MediaType::constant("application/x-www-form-urlencoded", 11);
    pub const MULTIPART_FORM_DATA: MediaType = MediaType::constant("multipart/form-data", 9);
    pub const HTML: MediaType = MediaType::constant("text/html", 4);
    pub const TEXT: MediaType = MediaType::constant("text/plain", 4);
    pub const CSS: MediaType = MediaType::constant("text/css", 4);

    const fn constant(value: &'static str, slash: usize) -> Self {
        Self { value: Cow::Borrowed(value), slash, params: Vec::new() }
    }

    /// Parses a single media type. A bare `*` is read as `*/*`.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        let (essence, params) = match raw.split_once(';') {
            Some((essence, params)) => (essence.trim(), Some(params)),
            None => (raw, None),
        };
        let essence = if essence == "*" { "*/*" } else { essence };

        let slash = essence.find('/').ok_or_else(|| invalid(raw))?;
        let (kind, subtype) = (&essence[..slash], &essence[slash + 1..]);
        if kind.is_empty() || subtype.is_empty() || subtype.contains('/') {
            return Err(invalid(raw));
        }

        let params = params
            .into_iter()
            .flat_map(|p| p.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| {
                    (name.to_ascii_lowercase(), value.trim().trim_matches('"').to_owned())
                })
            })
            .collect();

        Ok(Self { value: Cow::Owned(essence.to_ascii_lowercase()), slash, params })
    }

    /// Parses a comma-separated header value (e.g. `Accept`) into media types
    /// ordered by quality, then specificity. Entries that do not parse are
    /// skipped. The sort is stable, so header order breaks remaining ties.
    pub fn parse_list(header: &str) -> Vec<MediaType> {
        let mut types: Vec<MediaType> = header
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(|s| MediaType::parse(s).ok())
            .collect();
        types.sort_by(MediaType::precedence);
        types
    }

    /// `type/subtype`, without parameters.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn type_(&self) -> &str {
        &self.value[..self.slash]
    }

    pub fn subtype(&self) -> &str {
        &self.value[self.slash + 1..]
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// The `q` parameter, or `1.0` when absent or unreadable.
    pub fn quality(&self) -> f32 {
        self.param("q")
            .and_then(|q| q.parse::<f32>().ok())
            .filter(|q| q.is_finite())
            .unwrap_or(1.0)
    }

    /// The `charset` parameter. Textual types default to `UTF-8`; everything
    /// else has no charset unless one is given.
    pub fn charset(&self) -> Option<&str> {
        match self.param("charset") {
            Some(charset) => Some(charset),
            None if self.is_textual() => Some("UTF-8"),
            None => None,
        }
    }

    /// `text/*`, `application/json` and `application/javascript`.
    pub fn is_textual(&self) -> bool {
        self.type_() == "text" || self.is_json() || self.value == "application/javascript"
    }

    pub fn is_json(&self) -> bool {
        self.value == "application/json"
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.type_() == "*"
    }

    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype() == "*"
    }

    /// Returns a copy carrying a `charset` parameter.
    pub fn with_charset(&self, charset: &str) -> MediaType {
        let mut copy = self.clone();
        copy.params.retain(|(k, _)| k != "charset");
        copy.params.push(("charset".to_owned(), charset.to_owned()));
        copy
    }

    /// True when `self` and `other` match in either direction, so a wildcard
    /// on either side is honoured.
    pub fn is_compatible(&self, other: &MediaType) -> bool {
        MediaType::matches(&self.value, &other.value) || MediaType::matches(&other.value, &self.value)
    }

    /// Matches `expected` against a header value that may list several
    /// comma-separated candidates. One matching candidate is enough.
    ///
    /// A candidate of `*` or `*/*` always matches. Otherwise the two strings
    /// are compared character by character (ASCII case-insensitive, ignoring
    /// parameters). At the first mismatch, a `*` that directly follows the
    /// `/` in `expected` is a subtype wildcard: at the end of `expected` it
    /// matches anything, elsewhere the rest of `expected` must be a suffix of
    /// the candidate (`application/*+json`).
    pub fn matches(expected: &str, content_type: &str) -> bool {
        let expected = essence(expected).as_bytes();
        content_type
            .split(',')
            .any(|candidate| matches_one(expected, essence(candidate).as_bytes()))
    }

    /// Content negotiation. Picks the produced type the client prefers.
    ///
    /// Without an `Accept` header the first produced type wins. Otherwise
    /// every produced type that matches at least one acceptable entry is a
    /// candidate; the winner is the candidate whose best matching entry has
    /// the highest quality, then the most specific entry, then the most
    /// specific produced type, then the earliest declaration. Entries with
    /// `q=0` never match. Returns `None` when nothing is acceptable.
    pub fn accept(produces: &[MediaType], accept: Option<&str>) -> Option<MediaType> {
        let accept = match accept.map(str::trim) {
            Some(accept) if !accept.is_empty() => accept,
            _ => return produces.first().cloned(),
        };
        let accepted = MediaType::parse_list(accept);

        let mut best: Option<(&MediaType, Score)> = None;
        for produce in produces {
            let score = accepted
                .iter()
                .filter(|entry| entry.quality() > 0.0 && entry.is_compatible(produce))
                .map(|entry| Score {
                    quality: entry.quality(),
                    entry: entry.specificity(),
                    produce: produce.specificity(),
                })
                .max_by(Score::cmp);
            if let Some(score) = score {
                let wins = best
                    .as_ref()
                    .is_none_or(|(_, current)| score.cmp(current) == Ordering::Greater);
                if wins {
                    best = Some((produce, score));
                }
            }
        }
        best.map(|(produce, _)| produce.clone())
    }

    /// Guesses a media type from a file extension (without the dot).
    pub fn from_file_extension(ext: &str) -> Option<MediaType> {
        let value = match ext.to_ascii_lowercase().as_str() {
            "html" | "htm" => return Some(MediaType::HTML),
            "json" => return Some(MediaType::JSON),
            "js" | "mjs" => return Some(MediaType::JAVASCRIPT),
            "css" => return Some(MediaType::CSS),
            "txt" => return Some(MediaType::TEXT),
            "xml" => return Some(MediaType::XML),
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "pdf" => "application/pdf",
            _ => return None,
        };
        MediaType::parse(value).ok()
    }

    /// 0 for `*/*`, 1 for `type/*`, 2 for a concrete type, plus one per
    /// parameter other than `q`.
    fn specificity(&self) -> usize {
        let base = match (self.is_wildcard_type(), self.is_wildcard_subtype()) {
            (true, _) => 0,
            (false, true) => 1,
            (false, false) => 2,
        };
        base + self.params.iter().filter(|(k, _)| k != "q").count()
    }

    /// Higher quality first, then more specific first.
    fn precedence(a: &MediaType, b: &MediaType) -> Ordering {
        b.quality()
            .total_cmp(&a.quality())
            .then_with(|| b.specificity().cmp(&a.specificity()))
    }
}

#[derive(Clone, Copy)]
struct Score {
    quality: f32,
    entry: usize,
    produce: usize,
}

impl Score {
    fn cmp(&self, other: &Score) -> Ordering {
        self.quality
            .total_cmp(&other.quality)
            .then_with(|| self.entry.cmp(&other.entry))
            .then_with(|| self.produce.cmp(&other.produce))
    }
}

fn invalid(raw: &str) -> Error {
    Error::status(StatusCode::BAD_REQUEST, format!("Invalid media type: {raw}"))
}

/// `type/subtype` part of a raw value: trimmed, parameters dropped.
fn essence(raw: &str) -> &str {
    raw.split(';').next().unwrap_or_default().trim()
}

fn matches_one(expected: &[u8], candidate: &[u8]) -> bool {
    if is_any(expected) || is_any(candidate) {
        return true;
    }
    for (i, &want) in expected.iter().enumerate() {
        let same = candidate.get(i).is_some_and(|got| got.eq_ignore_ascii_case(&want));
        if same {
            continue;
        }
        if want == b'*' && i > 0 && expected[i - 1] == b'/' {
            if i == expected.len() - 1 {
                return true;
            }
            let tail = &expected[i + 1..];
            let rest = candidate.get(i..).unwrap_or_default();
            return rest.len() >= tail.len()
                && rest[rest.len() - tail.len()..].eq_ignore_ascii_case(tail);
        }
        return false;
    }
    expected.len() == candidate.len()
}

fn is_any(essence: &[u8]) -> bool {
    essence == b"*" || essence == b"*/*"
}

impl PartialEq for MediaType {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for MediaType {}

impl Hash for MediaType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaType::parse(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)?;
        for (name, value) in &self.params {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}
