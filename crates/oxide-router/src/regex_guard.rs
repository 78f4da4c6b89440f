//! Regex constraint safety checks and compiled constraints.
//!
//! Constraints are always matched against a whole segment, so they are
//! compiled as `^(?:source)$`. Before compiling, a constraint is checked
//! for length, backreferences and nested unbounded quantifiers.

use std::time::{Duration, Instant};

use regex::Regex;
use tracing::warn;

use crate::error::{Result, RouterError};
use crate::options::{AnchorPolicy, RegexSafetyOptions, UnsafeRegexPolicy};

/// A compiled, anchored regex constraint.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
}

impl CompiledPattern {
    /// The constraint source with anchors stripped.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Tests `value` against the constraint.
    ///
    /// With a budget, an evaluation that used up the whole budget is
    /// reported as [`RouterError::RegexTimeout`] once it returns; the
    /// evaluation itself is not preempted. A zero budget is exhausted by
    /// every evaluation.
    pub fn is_match(&self, value: &str, budget: Option<Duration>) -> Result<bool> {
        let Some(budget) = budget else {
            return Ok(self.regex.is_match(value));
        };
        let started = Instant::now();
        let matched = self.regex.is_match(value);
        let elapsed = started.elapsed();
        if elapsed >= budget {
            return Err(RouterError::RegexTimeout {
                regex: self.source.clone(),
                elapsed_micros: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            });
        }
        Ok(matched)
    }
}

/// Validates and compiles a constraint.
pub fn compile(source: &str, options: &RegexSafetyOptions) -> Result<CompiledPattern> {
    let stripped = strip_anchors(source, options.on_anchor)?;
    validate(&stripped, options)?;
    let regex = Regex::new(&format!("^(?:{stripped})$")).map_err(|e| RouterError::InvalidRegex {
        regex: stripped.clone(),
        message: e.to_string(),
    })?;
    Ok(CompiledPattern {
        source: stripped,
        regex,
    })
}

/// Runs the safety checks on an (already anchor-stripped) constraint.
///
/// Overlong sources and backreferences are always rejected; nested
/// unbounded quantifiers follow [`RegexSafetyOptions::on_unsafe`].
pub fn validate(source: &str, options: &RegexSafetyOptions) -> Result<()> {
    if source.len() > options.max_length {
        return Err(unsafe_regex(
            source,
            format!("source exceeds {} bytes", options.max_length),
        ));
    }
    if has_backreference(source) {
        return Err(unsafe_regex(source, "backreferences are not allowed".into()));
    }
    if has_nested_quantifier(source) {
        let reason = "nested unbounded quantifier (catastrophic backtracking risk)";
        match options.on_unsafe {
            UnsafeRegexPolicy::Error => return Err(unsafe_regex(source, reason.into())),
            UnsafeRegexPolicy::Warn => warn!(regex = source, "{reason}"),
        }
    }
    Ok(())
}

/// Removes a leading `^` and an unescaped trailing `$`.
pub fn strip_anchors(source: &str, policy: AnchorPolicy) -> Result<String> {
    let mut body = source;
    let mut stripped = false;
    if let Some(rest) = body.strip_prefix('^') {
        body = rest;
        stripped = true;
    }
    if body.ends_with('$') {
        let escapes = body[..body.len() - 1]
            .bytes()
            .rev()
            .take_while(|&b| b == b'\\')
            .count();
        if escapes % 2 == 0 {
            body = &body[..body.len() - 1];
            stripped = true;
        }
    }
    if stripped {
        match policy {
            AnchorPolicy::Strip => {}
            AnchorPolicy::Warn => {
                warn!(regex = source, "anchors are implicit in constraints; stripped");
            }
            AnchorPolicy::Reject => {
                return Err(unsafe_regex(
                    source,
                    "anchors are implicit in constraints".into(),
                ));
            }
        }
    }
    Ok(body.to_string())
}

fn unsafe_regex(source: &str, reason: String) -> RouterError {
    RouterError::UnsafeRegex {
        regex: source.to_string(),
        reason,
    }
}

fn has_backreference(source: &str) -> bool {
    let bytes = source.as_bytes();
    let mut i = 0;
    let mut in_class = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                let next = bytes[i + 1];
                if !in_class && (matches!(next, b'1'..=b'9') || next == b'k' || next == b'g') {
                    return true;
                }
                i += 2;
                continue;
            }
            b'[' => in_class = true,
            b']' => in_class = false,
            _ => {}
        }
        i += 1;
    }
    false
}

/// Returns the byte length of an unbounded quantifier starting at `i`
/// (`+`, `*` or `{n,}`), or `None`.
fn unbounded_quantifier_at(bytes: &[u8], i: usize) -> Option<usize> {
    match bytes.get(i)? {
        b'+' | b'*' => Some(1),
        b'{' => {
            let close = bytes[i..].iter().position(|&b| b == b'}')? + i;
            let body = &bytes[i + 1..close];
            let comma = body.iter().position(|&b| b == b',')?;
            let (min, max) = (&body[..comma], &body[comma + 1..]);
            if !min.is_empty() && min.iter().all(u8::is_ascii_digit) && max.is_empty() {
                Some(close - i + 1)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Detects a group that contains an unbounded quantifier and is itself
/// repeated without bound, e.g. `(a+)+` or `((ab)*x)*`.
fn has_nested_quantifier(source: &str) -> bool {
    let bytes = source.as_bytes();
    // One flag per open group: does it contain an unbounded quantifier?
    let mut groups: Vec<bool> = vec![false];
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'[' => {
                i += 1;
                if bytes.get(i) == Some(&b'^') {
                    i += 1;
                }
                if bytes.get(i) == Some(&b']') {
                    i += 1;
                }
                while i < bytes.len() && bytes[i] != b']' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'(' => groups.push(false),
            b')' => {
                let inner = groups.len() > 1 && groups.pop().unwrap_or(false);
                let repeated = unbounded_quantifier_at(bytes, i + 1).is_some();
                if inner && repeated {
                    return true;
                }
                if let Some(outer) = groups.last_mut() {
                    *outer |= inner || repeated;
                }
                if let Some(len) = unbounded_quantifier_at(bytes, i + 1) {
                    i += len;
                }
            }
            _ => {
                if let Some(len) = unbounded_quantifier_at(bytes, i) {
                    if let Some(current) = groups.last_mut() {
                        *current = true;
                    }
                    i += len;
                    continue;
                }
            }
        }
        i += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> RegexSafetyOptions {
        RegexSafetyOptions::default()
    }

    #[test]
    fn test_compile_is_anchored() {
        let pattern = compile("[0-9]+", &options()).unwrap();
        assert!(pattern.is_match("42", None).unwrap());
        assert!(!pattern.is_match("42a", None).unwrap());
        assert!(!pattern.is_match("a42", None).unwrap());
    }

    #[test]
    fn test_alternation_is_grouped() {
        let pattern = compile("png|jpg", &options()).unwrap();
        assert!(pattern.is_match("png", None).unwrap());
        assert!(!pattern.is_match("pngx", None).unwrap());
    }

    #[test]
    fn test_anchor_policies() {
        assert_eq!(strip_anchors("^[a-z]+$", AnchorPolicy::Strip).unwrap(), "[a-z]+");
        assert_eq!(strip_anchors(r"a\$", AnchorPolicy::Strip).unwrap(), r"a\$");
        assert_eq!(strip_anchors(r"a\\$", AnchorPolicy::Strip).unwrap(), r"a\\");
        assert!(strip_anchors("^a", AnchorPolicy::Reject).is_err());
        assert!(strip_anchors("a", AnchorPolicy::Reject).is_ok());

        let pattern = compile("^[a-z]+$", &options()).unwrap();
        assert_eq!(pattern.source(), "[a-z]+");
    }

    #[test]
    fn test_nested_quantifiers_rejected() {
        for source in ["(a+)+", "(a*)*", "((ab)+)+", "(a{2,})*", "(x|y+)+", "([a-z]+)*"] {
            assert!(has_nested_quantifier(source), "{source}");
            assert!(
                matches!(
                    compile(source, &options()),
                    Err(RouterError::UnsafeRegex { .. })
                ),
                "{source}"
            );
        }
    }

    #[test]
    fn test_safe_patterns_accepted() {
        for source in [
            "[0-9]+",
            r"\d+-\d+",
            "(a|b)+",
            "(a+)?",
            "(ab){2,3}",
            r"[(+]+",
            r"\(a+\)+",
            "v[0-9]{1,}",
        ] {
            assert!(!has_nested_quantifier(source), "{source}");
            compile(source, &options()).unwrap();
        }
    }

    #[test]
    fn test_warn_policy_accepts_nested_quantifier() {
        let options = RegexSafetyOptions {
            on_unsafe: UnsafeRegexPolicy::Warn,
            ..RegexSafetyOptions::default()
        };
        let pattern = compile("(a+)+", &options).unwrap();
        assert!(pattern.is_match("aaa", None).unwrap());
    }

    #[test]
    fn test_backreferences_always_rejected() {
        let options = RegexSafetyOptions {
            on_unsafe: UnsafeRegexPolicy::Warn,
            ..RegexSafetyOptions::default()
        };
        assert!(matches!(
            compile(r"(a)\1", &options),
            Err(RouterError::UnsafeRegex { .. })
        ));
        assert!(has_backreference(r"(?<x>a)\k<x>"));
        assert!(!has_backreference(r"[\1]"));
    }

    #[test]
    fn test_length_limit() {
        let options = RegexSafetyOptions {
            max_length: 4,
            ..RegexSafetyOptions::default()
        };
        assert!(compile("[a-z]+", &options).is_err());
        assert!(compile("a+", &options).is_ok());
    }

    #[test]
    fn test_invalid_regex() {
        assert!(matches!(
            compile("[a-", &options()),
            Err(RouterError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_zero_budget_times_out() {
        let pattern = compile("[a-z]+", &options()).unwrap();
        // Holds even when the clock reports no elapsed time.
        let err = pattern.is_match("a", Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, RouterError::RegexTimeout { .. }));
        assert!(pattern
            .is_match("abc", Some(Duration::from_secs(60)))
            .unwrap());
    }
}
