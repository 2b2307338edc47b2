//! `Range` header support for partial content.
//!
//! Only single ranges are honoured: anything after the first comma is
//! ignored, and the response is a plain `206` for the first range (no
//! `multipart/byteranges`).
//!
//! ```rust
//! use weft::ByteRange;
//! use http::StatusCode;
//!
//! let range = ByteRange::parse(Some("bytes=0-99"), 1000);
//! assert_eq!(range.status(), StatusCode::PARTIAL_CONTENT);
//! assert_eq!(range.content_range(), "bytes 0-99/1000");
//!
//! let tail = ByteRange::parse(Some("bytes=-100"), 1000);
//! assert_eq!((tail.start(), tail.end()), (900, 999));
//! ```

use bytes::Bytes;
use http::StatusCode;
use http::header::{ACCEPT_RANGES, CONTENT_RANGE};
use tracing::trace;

use crate::context::Context;
use crate::error::{Error, Result};

const BYTES_RANGE: &str = "bytes=";

/// The outcome of reading a `Range` header against a known length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ByteRange {
    value: Option<String>,
    start: u64,
    length: u64,
    content_length: u64,
    content_range: String,
    outcome: Outcome,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Full,
    Partial,
    Unsatisfiable,
}

impl ByteRange {
    /// Parses `range` (the raw `Range` header) for a body of
    /// `content_length` bytes.
    ///
    /// - no header, or an empty body: `200`, the whole content
    /// - `bytes=start-end`, `bytes=start-`, `bytes=-suffix`: `206`
    /// - any other prefix, malformed numbers, or `start > end`: `416`
    pub fn parse(range: Option<&str>, content_length: u64) -> ByteRange {
        let range_outcome = match range {
            None => ByteRange::full(content_length),
            Some(_) if content_length == 0 => ByteRange::full(content_length),
            Some(value) => match parse_first(value, content_length) {
                Some((start, end)) => ByteRange {
                    value: Some(value.to_owned()),
                    start,
                    length: end - start + 1,
                    content_length,
                    content_range: format!("bytes {start}-{end}/{content_length}"),
                    outcome: Outcome::Partial,
                },
                None => ByteRange {
                    value: Some(value.to_owned()),
                    start: 0,
                    length: 0,
                    content_length,
                    content_range: format!("bytes */{content_length}"),
                    outcome: Outcome::Unsatisfiable,
                },
            },
        };
        trace!(
            range,
            content_length,
            status = range_outcome.status().as_u16(),
            content_range = %range_outcome.content_range,
            "byte range"
        );
        range_outcome
    }

    fn full(content_length: u64) -> ByteRange {
        ByteRange {
            value: None,
            start: 0,
            length: content_length,
            content_length,
            content_range: format!("bytes */{content_length}"),
            outcome: Outcome::Full,
        }
    }

    /// The raw header this outcome came from.
    pub fn value(&self) -> Option<&str> { self.value.as_deref() }
    pub fn start(&self) -> u64 { self.start }
    pub fn length(&self) -> u64 { self.length }
    pub fn content_length(&self) -> u64 { self.content_length }
    pub fn content_range(&self) -> &str { &self.content_range }

    pub fn status(&self) -> StatusCode {
        match self.outcome {
            Outcome::Full => StatusCode::OK,
            Outcome::Partial => StatusCode::PARTIAL_CONTENT,
            Outcome::Unsatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    /// Last byte position, inclusive. Meaningless for `416`.
    pub fn end(&self) -> u64 {
        (self.start + self.length).saturating_sub(1)
    }

    /// Applies the outcome to the response.
    ///
    /// `416` fails with a range error; `206` sets `Accept-Ranges`,
    /// `Content-Range`, `Content-Length` and the status; `200` does nothing.
    pub fn apply(&self, ctx: &Context) -> Result<()> {
        match self.outcome {
            Outcome::Unsatisfiable => {
                Err(Error::range_not_satisfiable(self.value.clone().unwrap_or_default()))
            }
            Outcome::Partial => {
                ctx.set_header(ACCEPT_RANGES, "bytes")?;
                ctx.set_header(CONTENT_RANGE, &self.content_range)?;
                ctx.set_content_length(self.length)?;
                ctx.set_status(StatusCode::PARTIAL_CONTENT)
            }
            Outcome::Full => Ok(()),
        }
    }

    /// The selected window of an in-memory body. `200` returns the body as
    /// is, `416` an empty one.
    pub fn slice(&self, body: &Bytes) -> Bytes {
        match self.outcome {
            Outcome::Partial => {
                let start = usize::try_from(self.start).unwrap_or(usize::MAX).min(body.len());
                let end = usize::try_from(self.start.saturating_add(self.length))
                    .unwrap_or(usize::MAX)
                    .min(body.len());
                body.slice(start..end)
            }
            Outcome::Unsatisfiable => Bytes::new(),
            Outcome::Full => body.clone(),
        }
    }
}

/// Resolves the first range unit to inclusive `(start, end)` positions, or
/// `None` when it cannot be satisfied.
fn parse_first(value: &str, content_length: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix(BYTES_RANGE)?;
    let first = spec.split(',').next().unwrap_or_default().trim();
    let (start, end) = first.split_once('-')?;
    let start = number(start)?;
    let end = number(end)?;
    let last = content_length - 1;

    let (start, end) = match (start, end) {
        (None, None) => return None,
        // Suffix longer than the content selects all of it.
        (None, Some(suffix)) => (content_length.saturating_sub(suffix), last),
        (Some(start), None) => (start, last),
        (Some(start), Some(end)) => (start, end.min(last)),
    };
    (start <= end).then_some((start, end))
}

/// `""` is an absent bound; anything else must be a base-10 number.
fn number(raw: &str) -> Option<Option<u64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(None);
    }
    raw.parse::<u64>().ok().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_header_is_full_content() {
        let range = ByteRange::parse(None, 1000);
        assert_eq!(range.status(), StatusCode::OK);
        assert_eq!(range.start(), 0);
        assert_eq!(range.length(), 1000);
        assert_eq!(range.content_range(), "bytes */1000");
    }

    #[test]
    fn empty_content_is_full_content() {
        let range = ByteRange::parse(Some("bytes=0-10"), 0);
        assert_eq!(range.status(), StatusCode::OK);
        assert_eq!(range.content_range(), "bytes */0");
    }

    #[test]
    fn closed_range() {
        let range = ByteRange::parse(Some("bytes=0-99"), 1000);
        assert_eq!(range.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(range.start(), 0);
        assert_eq!(range.length(), 100);
        assert_eq!(range.content_range(), "bytes 0-99/1000");
    }

    #[test]
    fn suffix_range() {
        let range = ByteRange::parse(Some("bytes=-100"), 1000);
        assert_eq!(range.start(), 900);
        assert_eq!(range.end(), 999);
        assert_eq!(range.content_range(), "bytes 900-999/1000");
    }

    #[test]
    fn suffix_longer_than_content() {
        let range = ByteRange::parse(Some("bytes=-5000"), 1000);
        assert_eq!(range.content_range(), "bytes 0-999/1000");
    }

    #[test]
    fn open_ended_range() {
        let range = ByteRange::parse(Some("bytes=500-"), 1000);
        assert_eq!(range.length(), 500);
        assert_eq!(range.content_range(), "bytes 500-999/1000");
    }

    #[test]
    fn end_is_clamped() {
        let range = ByteRange::parse(Some("bytes=990-5000"), 1000);
        assert_eq!(range.content_range(), "bytes 990-999/1000");
    }

    #[test]
    fn only_first_range_counts() {
        let range = ByteRange::parse(Some("bytes=0-9, 20-29, garbage"), 100);
        assert_eq!(range.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(range.content_range(), "bytes 0-9/100");
    }

    #[test]
    fn unsatisfiable() {
        for header in ["items=0-9", "bytes=abc-9", "bytes=-", "bytes=5", "bytes=9-1", "bytes=1000-"] {
            let range = ByteRange::parse(Some(header), 1000);
            assert_eq!(range.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{header}");
            assert_eq!(range.content_range(), "bytes */1000");
        }
    }

    #[test]
    fn apply_partial_content() {
        let ctx = Context::builder().build();
        ByteRange::parse(Some("bytes=10-19"), 100).apply(&ctx).unwrap();
        assert_eq!(ctx.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(ctx.response_header("accept-ranges").as_deref(), Some("bytes"));
        assert_eq!(ctx.response_header("content-range").as_deref(), Some("bytes 10-19/100"));
        assert_eq!(ctx.response_header("content-length").as_deref(), Some("10"));
    }

    #[test]
    fn apply_full_is_noop() {
        let ctx = Context::builder().build();
        ByteRange::parse(None, 100).apply(&ctx).unwrap();
        assert_eq!(ctx.status(), StatusCode::OK);
        assert_eq!(ctx.response_header("content-range"), None);
    }

    #[test]
    fn apply_unsatisfiable_fails() {
        let ctx = Context::builder().build();
        let err = ByteRange::parse(Some("bytes=9-1"), 100).apply(&ctx).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[test]
    fn slice_body() {
        let body = Bytes::from_static(b"0123456789");
        assert_eq!(ByteRange::parse(Some("bytes=2-4"), 10).slice(&body), "234");
        assert_eq!(ByteRange::parse(Some("bytes=-3"), 10).slice(&body), "789");
        assert_eq!(ByteRange::parse(None, 10).slice(&body), body);
        assert!(ByteRange::parse(Some("bytes=8-2"), 10).slice(&body).is_empty());
    }

    #[test]
    fn slice_clamps_to_shorter_body() {
        // declared length larger than the bytes actually held
        let body = Bytes::from_static(b"0123");
        let range = ByteRange::parse(Some("bytes=2-"), u64::MAX);
        assert_eq!(range.slice(&body), "23");
        let range = ByteRange::parse(Some("bytes=10-20"), 100);
        assert!(range.slice(&body).is_empty());
    }
}
