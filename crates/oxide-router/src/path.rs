//! Request path normalization and lazy percent-decoding.
//!
//! A raw path is turned into a canonical string plus a list of segment
//! spans into it. Static segments are compared against route text before
//! any decoding; a segment is only decoded once it binds to a parameter.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

use crate::error::{Result, RouterError};
use crate::options::RouterOptions;

/// A byte range into a normalized path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the length of the span in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if the span is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Result of normalizing a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    canonical: String,
    folded: Option<String>,
    segments: Vec<Span>,
    trailing_slash: bool,
    decode_hints: Vec<bool>,
}

impl NormalizedPath {
    /// The canonical path, with request case preserved.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The canonical path as compared against static route text.
    pub fn folded(&self) -> &str {
        self.folded.as_deref().unwrap_or(&self.canonical)
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for the root path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment spans, in order.
    pub fn spans(&self) -> &[Span] {
        &self.segments
    }

    /// Raw (undecoded, case-preserved) text of segment `index`.
    pub fn segment(&self, index: usize) -> &str {
        let span = self.segments[index];
        &self.canonical[span.start..span.end]
    }

    /// Segment `index` as compared against static route text.
    pub fn folded_segment(&self, index: usize) -> &str {
        let span = self.segments[index];
        &self.folded()[span.start..span.end]
    }

    /// Raw text from segment `index` to the end of the path.
    pub fn remainder(&self, index: usize) -> &str {
        match self.segments.get(index) {
            Some(span) => &self.canonical[span.start..],
            None => "",
        }
    }

    /// Whether the raw path ended with a separator.
    pub const fn trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// Whether segment `index` contains percent escapes.
    pub fn needs_decode(&self, index: usize) -> bool {
        self.decode_hints.get(index).copied().unwrap_or(false)
    }
}

/// Classification of a segment for traversal resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DotSegment {
    Current,
    Parent,
    Other,
}

fn classify_dots(segment: &str) -> DotSegment {
    const CURRENT: [&str; 2] = [".", "%2e"];
    const PARENT: [&str; 4] = ["..", ".%2e", "%2e.", "%2e%2e"];

    if segment.len() > 6 || !segment.starts_with(['.', '%']) {
        return DotSegment::Other;
    }
    if CURRENT.iter().any(|d| d.eq_ignore_ascii_case(segment)) {
        DotSegment::Current
    } else if PARENT.iter().any(|d| d.eq_ignore_ascii_case(segment)) {
        DotSegment::Parent
    } else {
        DotSegment::Other
    }
}

/// Normalizes request paths according to the router policies.
#[derive(Debug, Clone)]
pub struct PathNormalizer {
    case_sensitive: bool,
    ignore_trailing_slash: bool,
    collapse_slashes: bool,
    block_traversal: bool,
    max_segment_length: usize,
    max_path_length: usize,
}

impl PathNormalizer {
    /// Creates a normalizer from router options.
    pub fn new(options: &RouterOptions) -> Self {
        Self {
            case_sensitive: options.case_sensitive,
            ignore_trailing_slash: options.ignore_trailing_slash,
            collapse_slashes: options.collapse_slashes,
            block_traversal: options.block_traversal,
            max_segment_length: options.max_segment_length,
            max_path_length: options.max_path_length,
        }
    }

    /// Normalizes a raw request path.
    ///
    /// Anything from the first `?` or `#` on is ignored. Overlong paths or
    /// segments are always rejected, never truncated.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedPath> {
        let path = raw.split(['?', '#']).next().unwrap_or_default();
        if path.len() > self.max_path_length {
            return Err(RouterError::PathTooLong {
                len: path.len(),
                max: self.max_path_length,
            });
        }

        let body = path.strip_prefix('/').unwrap_or(path);
        let trailing_slash = path.len() > 1 && path.ends_with('/');

        let mut kept: Vec<&str> = Vec::new();
        let mut pieces = body.split('/').peekable();
        while let Some(piece) = pieces.next() {
            let is_last = pieces.peek().is_none();
            if piece.is_empty() {
                if !is_last && !self.collapse_slashes {
                    kept.push(piece);
                }
                continue;
            }
            if piece.len() > self.max_segment_length {
                return Err(RouterError::SegmentTooLong {
                    len: piece.len(),
                    max: self.max_segment_length,
                });
            }
            if self.block_traversal {
                match classify_dots(piece) {
                    DotSegment::Current => continue,
                    DotSegment::Parent => {
                        kept.pop();
                        continue;
                    }
                    DotSegment::Other => {}
                }
            }
            kept.push(piece);
        }

        let mut canonical = String::with_capacity(path.len().max(1));
        let mut segments = Vec::with_capacity(kept.len() + 1);
        let mut decode_hints = Vec::with_capacity(kept.len() + 1);
        for piece in &kept {
            canonical.push('/');
            let start = canonical.len();
            canonical.push_str(piece);
            segments.push(Span::new(start, canonical.len()));
            decode_hints.push(piece.contains('%'));
        }
        if trailing_slash && !self.ignore_trailing_slash && !kept.is_empty() {
            canonical.push('/');
            segments.push(Span::new(canonical.len(), canonical.len()));
            decode_hints.push(false);
        }
        if canonical.is_empty() {
            canonical.push('/');
        }

        let folded = if !self.case_sensitive && canonical.bytes().any(|b| b.is_ascii_uppercase()) {
            Some(canonical.to_ascii_lowercase())
        } else {
            None
        };

        Ok(NormalizedPath {
            canonical,
            folded,
            segments,
            trailing_slash,
            decode_hints,
        })
    }

    /// Folds static route text the same way request segments are folded.
    pub fn fold<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.case_sensitive || !text.bytes().any(|b| b.is_ascii_uppercase()) {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(text.to_ascii_lowercase())
        }
    }

    /// Returns true if `raw` is already in canonical form and can be
    /// looked up without normalization.
    pub fn is_canonical(&self, raw: &str) -> bool {
        if raw.len() > self.max_path_length || !raw.starts_with('/') {
            return false;
        }
        if raw.bytes().any(|b| matches!(b, b'%' | b'?' | b'#')) {
            return false;
        }
        if !self.case_sensitive && raw.bytes().any(|b| b.is_ascii_uppercase()) {
            return false;
        }
        if raw.len() > 1 && raw.ends_with('/') && self.ignore_trailing_slash {
            return false;
        }
        let body = &raw[1..];
        let interior = body.strip_suffix('/').unwrap_or(body);
        if body.is_empty() {
            return true;
        }
        interior.split('/').all(|segment| {
            !segment.is_empty()
                && segment.len() <= self.max_segment_length
                && !(self.block_traversal && classify_dots(segment) != DotSegment::Other)
        })
    }
}

/// Decodes a segment that is about to bind to a parameter.
///
/// Escapes are validated first: with `fail_fast` a malformed escape (or
/// invalid UTF-8 after decoding) is an error, otherwise the literal text is
/// returned. An encoded separator is rejected regardless of `fail_fast`
/// when `reject_encoded_slash` is set.
pub fn decode_segment(
    raw: &str,
    fail_fast: bool,
    reject_encoded_slash: bool,
) -> Result<Cow<'_, str>> {
    if !raw.contains('%') {
        return Ok(Cow::Borrowed(raw));
    }

    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return if fail_fast {
                    Err(RouterError::MalformedEncoding {
                        segment: raw.to_string(),
                    })
                } else {
                    Ok(Cow::Borrowed(raw))
                };
            }
            if reject_encoded_slash
                && bytes[i + 1] == b'2'
                && bytes[i + 2].eq_ignore_ascii_case(&b'f')
            {
                return Err(RouterError::EncodedSeparator {
                    segment: raw.to_string(),
                });
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => Ok(Cow::Owned(decoded.into_owned())),
        Err(_) if fail_fast => Err(RouterError::MalformedEncoding {
            segment: raw.to_string(),
        }),
        Err(_) => Ok(Cow::Borrowed(raw)),
    }
}
