//! Route pattern grammar.
//!
//! Per segment:
//! - `users` - literal text
//! - `:id` - named parameter, `:id?` optional
//! - `:id{[0-9]+}` - parameter with a regex constraint
//! - `:rest+` / `:rest*` - one-or-more / zero-or-more trailing segments
//! - `*` / `*rest` - catch-all for the remainder of the path
//!
//! Multi-segment captures must be the final segment.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::options::RouterOptions;
use crate::path::Span;

/// Upper bound on optional parameters in one pattern; each one doubles the
/// number of registered variants.
const MAX_OPTIONAL_PARAMS: usize = 8;

/// A pattern syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    /// The error message.
    pub message: String,
    /// The location of the error within the pattern.
    pub span: Span,
}

impl PatternError {
    /// Creates a new pattern error.
    #[must_use]
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at position {}..{}",
            self.message, self.span.start, self.span.end
        )
    }
}

impl std::error::Error for PatternError {}

/// How a catch-all was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WildcardOrigin {
    /// `*` or `*name`: one or more segments.
    Star,
    /// `:name+`: one or more segments.
    OneOrMore,
    /// `:name*`: zero or more segments.
    ZeroOrMore,
}

impl WildcardOrigin {
    /// Whether an empty remainder satisfies the capture.
    pub const fn accepts_empty(self) -> bool {
        matches!(self, Self::ZeroOrMore)
    }
}

/// A single-segment parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub constraint: Option<String>,
    pub optional: bool,
}

/// A multi-segment capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardSpec {
    pub name: String,
    pub origin: WildcardOrigin,
}

/// One parsed pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Param(ParamSpec),
    Wildcard(WildcardSpec),
}

/// A registration variant produced by desugaring optional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant<'a> {
    /// Segments present in this variant.
    pub segments: Vec<&'a Segment>,
    /// Optional parameter names left out of this variant.
    pub omitted: Vec<String>,
}

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPattern {
    source: String,
    segments: Vec<Segment>,
}

impl ParsedPattern {
    /// Parses `pattern` under the normalization rules in `options`.
    pub fn parse(pattern: &str, options: &RouterOptions) -> Result<Self> {
        let wrap = |source: PatternError| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        };

        let raw = PatternParser::new(pattern).parse().map_err(wrap)?;

        let mut segments = Vec::with_capacity(raw.len());
        let count = raw.len();
        for (i, (segment, span)) in raw.into_iter().enumerate() {
            let is_last = i + 1 == count;
            if matches!(&segment, Segment::Static(text) if text.is_empty()) {
                let keep = if is_last {
                    !options.ignore_trailing_slash && !segments.is_empty()
                } else {
                    !options.collapse_slashes
                };
                if keep {
                    segments.push(segment);
                }
                continue;
            }
            match &segment {
                Segment::Static(text) => {
                    if text.len() > options.max_segment_length {
                        return Err(RouterError::SegmentTooLong {
                            len: text.len(),
                            max: options.max_segment_length,
                        });
                    }
                    if options.block_traversal && (text == "." || text == "..") {
                        return Err(wrap(PatternError::new(
                            "dot segments are resolved before matching and cannot be registered",
                            span,
                        )));
                    }
                }
                Segment::Wildcard(_) if !is_last => {
                    return Err(wrap(PatternError::new(
                        "multi-segment capture must be the final segment",
                        span,
                    )));
                }
                _ => {}
            }
            segments.push(segment);
        }

        let parsed = Self {
            source: pattern.to_string(),
            segments,
        };
        parsed.check_params(options)?;
        Ok(parsed)
    }

    fn check_params(&self, options: &RouterOptions) -> Result<()> {
        let mut seen = HashSet::new();
        let mut optional = 0;
        for name in self.param_names() {
            if !seen.insert(name) {
                return Err(RouterError::DuplicateParamName {
                    pattern: self.source.clone(),
                    name: name.to_string(),
                });
            }
        }
        if seen.len() > options.max_params {
            return Err(RouterError::TooManyParams {
                pattern: self.source.clone(),
                max: options.max_params,
            });
        }
        for segment in &self.segments {
            if let Segment::Param(p) = segment {
                if p.optional {
                    optional += 1;
                }
            }
        }
        if optional > MAX_OPTIONAL_PARAMS {
            return Err(RouterError::TooManyParams {
                pattern: self.source.clone(),
                max: MAX_OPTIONAL_PARAMS,
            });
        }
        Ok(())
    }

    /// The pattern as registered.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of every capture, in declaration order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Static(_) => None,
            Segment::Param(p) => Some(p.name.as_str()),
            Segment::Wildcard(w) => Some(w.name.as_str()),
        })
    }

    /// Returns true if the pattern contains no captures.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Static(_)))
    }

    /// Expands optional parameters into concrete registration variants.
    ///
    /// The full pattern comes first; each further variant leaves out a
    /// different subset of optional parameters.
    pub fn variants(&self) -> Vec<Variant<'_>> {
        let optional: Vec<usize> = self
            .segments
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Segment::Param(p) if p.optional => Some(i),
                _ => None,
            })
            .collect();

        (0u32..1 << optional.len())
            .map(|mask| {
                let mut segments = Vec::with_capacity(self.segments.len());
                let mut omitted = Vec::new();
                for (i, segment) in self.segments.iter().enumerate() {
                    match optional.iter().position(|&o| o == i) {
                        Some(bit) if mask & (1 << bit) != 0 => {
                            if let Segment::Param(p) = segment {
                                omitted.push(p.name.clone());
                            }
                        }
                        _ => segments.push(segment),
                    }
                }
                Variant { segments, omitted }
            })
            .collect()
    }
}

/// Splits a pattern into segments, tracking brace depth so that regex
/// constraints may contain `/`.
struct PatternParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> PatternParser<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: &str, start: usize) -> PatternError {
        PatternError::new(message, Span::new(start, self.pos.max(start + 1)))
    }

    fn parse(mut self) -> std::result::Result<Vec<(Segment, Span)>, PatternError> {
        if self.advance() != Some('/') {
            return Err(PatternError::new(
                "pattern must start with '/'",
                Span::new(0, 1),
            ));
        }

        let mut segments = Vec::new();
        loop {
            let start = self.pos;
            let segment = match self.peek() {
                Some(':') => self.parse_param()?,
                Some('*') => self.parse_catch_all()?,
                _ => self.parse_literal()?,
            };
            match self.peek() {
                None => {
                    segments.push((segment, Span::new(start, self.pos)));
                    return Ok(segments);
                }
                Some('/') => {
                    segments.push((segment, Span::new(start, self.pos)));
                    self.advance();
                }
                Some(c) => {
                    return Err(self.error(&format!("unexpected character '{c}'"), self.pos));
                }
            }
        }
    }

    fn parse_literal(&mut self) -> std::result::Result<Segment, PatternError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            match c {
                '/' => break,
                '{' | '}' => {
                    return Err(self.error("braces are only allowed in constraints", self.pos));
                }
                _ => {
                    self.advance();
                }
            }
        }
        Ok(Segment::Static(self.input[start..self.pos].to_string()))
    }

    fn parse_name(&mut self) -> &'a str {
        let start = self.pos;
        if self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                self.advance();
            }
        }
        &self.input[start..self.pos]
    }

    fn parse_constraint(&mut self) -> std::result::Result<String, PatternError> {
        let open = self.pos;
        self.advance(); // {
        let body_start = self.pos;
        let mut depth = 1usize;
        loop {
            match self.advance() {
                Some('\\') => {
                    if self.advance().is_none() {
                        break;
                    }
                }
                Some('{') => depth += 1,
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        let body = &self.input[body_start..self.pos - 1];
                        if body.is_empty() {
                            return Err(self.error("empty constraint", open));
                        }
                        return Ok(body.to_string());
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
        Err(self.error("unterminated constraint", open))
    }

    fn parse_param(&mut self) -> std::result::Result<Segment, PatternError> {
        let start = self.pos;
        self.advance(); // :
        let name = self.parse_name();
        if name.is_empty() {
            return Err(self.error("expected parameter name after ':'", start));
        }

        let constraint = if self.peek() == Some('{') {
            Some(self.parse_constraint()?)
        } else {
            None
        };

        let segment = match self.peek() {
            Some('?') => {
                self.advance();
                Segment::Param(ParamSpec {
                    name: name.to_string(),
                    constraint,
                    optional: true,
                })
            }
            Some(modifier @ ('+' | '*')) => {
                self.advance();
                if constraint.is_some() {
                    return Err(self.error(
                        "constraints are not supported on multi-segment captures",
                        start,
                    ));
                }
                let origin = if modifier == '+' {
                    WildcardOrigin::OneOrMore
                } else {
                    WildcardOrigin::ZeroOrMore
                };
                Segment::Wildcard(WildcardSpec {
                    name: name.to_string(),
                    origin,
                })
            }
            _ => Segment::Param(ParamSpec {
                name: name.to_string(),
                constraint,
                optional: false,
            }),
        };
        Ok(segment)
    }

    fn parse_catch_all(&mut self) -> std::result::Result<Segment, PatternError> {
        let start = self.pos;
        self.advance(); // *
        let name = self.parse_name();
        if !matches!(self.peek(), None | Some('/')) {
            return Err(self.error("invalid catch-all name", start));
        }
        Ok(Segment::Wildcard(WildcardSpec {
            name: if name.is_empty() {
                "*".to_string()
            } else {
                name.to_string()
            },
            origin: WildcardOrigin::Star,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(pattern: &str) -> ParsedPattern {
        ParsedPattern::parse(pattern, &RouterOptions::default())
            .unwrap_or_else(|e| panic!("Failed to parse: {pattern}\nError: {e}"))
    }

    fn parse_err(pattern: &str) -> RouterError {
        ParsedPattern::parse(pattern, &RouterOptions::default())
            .expect_err(&format!("Expected pattern error for: {pattern}"))
    }

    fn param(name: &str, constraint: Option<&str>, optional: bool) -> Segment {
        Segment::Param(ParamSpec {
            name: name.to_string(),
            constraint: constraint.map(str::to_string),
            optional,
        })
    }

    #[test]
    fn test_root_pattern() {
        assert!(parse("/").segments().is_empty());
    }

    #[test]
    fn test_static_and_params() {
        let p = parse("/users/:id/posts/:slug?");
        assert_eq!(
            p.segments(),
            &[
                Segment::Static("users".into()),
                param("id", None, false),
                Segment::Static("posts".into()),
                param("slug", None, true),
            ]
        );
        assert_eq!(p.param_names().collect::<Vec<_>>(), vec!["id", "slug"]);
        assert!(!p.is_static());
    }

    #[test]
    fn test_constraint_with_nested_braces() {
        let p = parse("/d/:year{[0-9]{4}}/:code{a/b}");
        assert_eq!(p.segments()[1], param("year", Some("[0-9]{4}"), false));
        assert_eq!(p.segments()[2], param("code", Some("a/b"), false));
    }

    #[test]
    fn test_escaped_brace_in_constraint() {
        let p = parse(r"/x/:v{\}+}");
        assert_eq!(p.segments()[1], param("v", Some(r"\}+"), false));
    }

    #[test]
    fn test_wildcards() {
        let p = parse("/proxy/*rest");
        assert_eq!(
            p.segments()[1],
            Segment::Wildcard(WildcardSpec {
                name: "rest".into(),
                origin: WildcardOrigin::Star
            })
        );
        let p = parse("/files/*");
        assert!(matches!(&p.segments()[1], Segment::Wildcard(w) if w.name == "*"));
        let p = parse("/a/:rest+");
        assert!(
            matches!(&p.segments()[1], Segment::Wildcard(w) if w.origin == WildcardOrigin::OneOrMore)
        );
        let p = parse("/a/:rest*");
        assert!(
            matches!(&p.segments()[1], Segment::Wildcard(w) if w.origin == WildcardOrigin::ZeroOrMore)
        );
    }

    #[test]
    fn test_trailing_and_repeated_slashes() {
        assert_eq!(parse("/a//b/").segments().len(), 2);

        let strict = RouterOptions {
            ignore_trailing_slash: false,
            collapse_slashes: false,
            ..RouterOptions::default()
        };
        let p = ParsedPattern::parse("/a//b/", &strict).unwrap();
        assert_eq!(
            p.segments(),
            &[
                Segment::Static("a".into()),
                Segment::Static(String::new()),
                Segment::Static("b".into()),
                Segment::Static(String::new()),
            ]
        );
    }

    #[test]
    fn test_errors() {
        for pattern in [
            "users",
            "/:",
            "/:id{",
            "/:id{}",
            "/:id!",
            "/*rest/more",
            "/:rest+/more",
            "/:rest{[a-z]+}+",
            "/a{b}",
            "/*re-st",
            "/a/../b",
        ] {
            assert!(
                matches!(parse_err(pattern), RouterError::InvalidPattern { .. }),
                "{pattern}"
            );
        }
    }

    #[test]
    fn test_error_span_points_into_pattern() {
        match parse_err("/users/:id!") {
            RouterError::InvalidPattern { source, .. } => {
                assert_eq!(source.span.start, 10);
                assert!(source.message.contains('!'));
            }
            other => panic!("Expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_param_name() {
        assert!(matches!(
            parse_err("/:id/x/:id"),
            RouterError::DuplicateParamName { name, .. } if name == "id"
        ));
    }

    #[test]
    fn test_too_many_params() {
        let options = RouterOptions {
            max_params: 1,
            ..RouterOptions::default()
        };
        assert!(matches!(
            ParsedPattern::parse("/:a/:b", &options),
            Err(RouterError::TooManyParams { max: 1, .. })
        ));
    }

    #[test]
    fn test_segment_too_long() {
        let options = RouterOptions {
            max_segment_length: 3,
            ..RouterOptions::default()
        };
        assert!(matches!(
            ParsedPattern::parse("/abcd", &options),
            Err(RouterError::SegmentTooLong { len: 4, max: 3 })
        ));
    }

    #[test]
    fn test_optional_variants() {
        let p = parse("/:a/:b?");
        let variants = p.variants();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].segments.len(), 2);
        assert!(variants[0].omitted.is_empty());
        assert_eq!(variants[1].segments.len(), 1);
        assert_eq!(variants[1].omitted, vec!["b".to_string()]);

        let p = parse("/x/:a?/y/:b?");
        let variants = p.variants();
        assert_eq!(variants.len(), 4);
        assert_eq!(variants[3].segments.len(), 2);
        assert_eq!(variants[3].omitted, vec!["a".to_string(), "b".to_string()]);
    }
}
