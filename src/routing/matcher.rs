//! Path pattern compilation and matching (component A).
//!
//! Generalizes a flat `:name` split-and-zip scan into a fuller segment
//! grammar: literal, named, optional-named
//! (only in the final position), wildcard-tail, and regex-constrained
//! segments.

use std::collections::HashMap;

use regex::Regex;

/// One compiled segment of a route pattern. `Named`/`OptionalNamed`/`Regex`
/// carry a `prefix`, the literal text fused before the `:name` in the same
/// path segment (e.g. `v` in `/v:version(\d+)/x`); empty when the segment is
/// a bare `:name`.
#[derive(Debug, Clone)]
pub enum Segment {
    Literal(String),
    Named { prefix: String, name: String },
    OptionalNamed { prefix: String, name: String },
    Wildcard,
    Regex { prefix: String, name: String, pattern: Regex },
}

/// A compiled pattern: an ordered list of segments plus the options it was
/// compiled with, since matching semantics (case sensitivity, trailing
/// slash) are pattern-compile-time decisions in this design.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    segments: Vec<Segment>,
    case_sensitive: bool,
    strict: bool,
}

/// Error from compiling a malformed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    OptionalNotLast,
    WildcardNotLast,
    InvalidRegex(String),
    EmptySegmentName,
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternError::OptionalNotLast => write!(f, "optional parameter must be the final segment"),
            PatternError::WildcardNotLast => write!(f, "wildcard must be the final segment"),
            PatternError::InvalidRegex(e) => write!(f, "invalid regex constraint: {e}"),
            PatternError::EmptySegmentName => write!(f, "segment name must not be empty"),
        }
    }
}

impl std::error::Error for PatternError {}

/// Strips a literal `prefix` off the front of `actual`, honoring the
/// pattern's case sensitivity, returning the remainder to bind as the
/// parameter value. `None` when `actual` does not start with `prefix`.
fn strip_prefix_segment<'a>(actual: &'a str, prefix: &str, case_sensitive: bool) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(actual);
    }
    if actual.len() < prefix.len() {
        return None;
    }
    let (head, rest) = actual.split_at(prefix.len());
    let matches = if case_sensitive { head == prefix } else { head.eq_ignore_ascii_case(prefix) };
    matches.then_some(rest)
}

fn split_segments(pattern: &str) -> Vec<&str> {
    pattern
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Splits a path to match against a compiled pattern's segments. In
/// non-strict mode (the default) a trailing slash is insignificant, same as
/// pattern compilation. In strict mode a trailing slash produces a trailing
/// empty segment, which only matches a pattern explicitly written with one
/// — so `/foo` and `/foo/` stop being equivalent.
fn split_path_segments(path: &str, strict: bool) -> Vec<&str> {
    if strict {
        path.trim_start_matches('/').split('/').collect()
    } else {
        split_segments(path)
    }
}

impl CompiledPattern {
    /// Compiles a pattern string like `/users/:id/posts/:postId?` or
    /// `/files/*` or `/v:version(\d+)/x`. `strict` controls whether a
    /// trailing slash on the matched path is significant; by default
    /// `/foo` and `/foo/` are equivalent.
    pub fn compile(pattern: &str, case_sensitive: bool, strict: bool) -> Result<Self, PatternError> {
        let raw_segments = split_segments(pattern);
        let mut segments = Vec::with_capacity(raw_segments.len());
        let last_index = raw_segments.len().saturating_sub(1);

        for (i, raw) in raw_segments.iter().enumerate() {
            let is_last = i == last_index;

            if *raw == "*" {
                if !is_last {
                    return Err(PatternError::WildcardNotLast);
                }
                segments.push(Segment::Wildcard);
                continue;
            }

            if let Some(colon) = raw.find(':') {
                let prefix = raw[..colon].to_string();
                let name = &raw[colon + 1..];

                if let Some(name) = name.strip_suffix('?') {
                    if !is_last {
                        return Err(PatternError::OptionalNotLast);
                    }
                    if name.is_empty() {
                        return Err(PatternError::EmptySegmentName);
                    }
                    segments.push(Segment::OptionalNamed { prefix, name: name.to_string() });
                    continue;
                }

                if let Some(open) = name.find('(') {
                    if let Some(close) = name.rfind(')') {
                        let param_name = &name[..open];
                        let regex_src = &name[open + 1..close];
                        if param_name.is_empty() {
                            return Err(PatternError::EmptySegmentName);
                        }
                        let anchored = format!("^(?:{})$", regex_src);
                        let regex = Regex::new(&anchored)
                            .map_err(|e| PatternError::InvalidRegex(e.to_string()))?;
                        segments.push(Segment::Regex {
                            prefix,
                            name: param_name.to_string(),
                            pattern: regex,
                        });
                        continue;
                    }
                }

                if name.is_empty() {
                    return Err(PatternError::EmptySegmentName);
                }
                segments.push(Segment::Named { prefix, name: name.to_string() });
                continue;
            }

            segments.push(Segment::Literal(raw.to_string()));
        }

        Ok(CompiledPattern {
            source: pattern.to_string(),
            segments,
            case_sensitive,
            strict,
        })
    }

    /// Attempts to match `path` against this compiled pattern, returning
    /// the extracted parameter bindings on success.
    ///
    /// Every declared name is present in the result, with optional
    /// parameters bound to the empty string when the path omits that
    /// final segment.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let path_segments = split_path_segments(path, self.strict);
        let mut params = HashMap::new();

        let has_wildcard = matches!(self.segments.last(), Some(Segment::Wildcard));
        let has_optional = matches!(self.segments.last(), Some(Segment::OptionalNamed { .. }));

        if has_wildcard {
            if path_segments.len() < self.segments.len() - 1 {
                return None;
            }
        } else if has_optional {
            let min = self.segments.len() - 1;
            if path_segments.len() != min && path_segments.len() != min + 1 {
                return None;
            }
        } else if path_segments.len() != self.segments.len() {
            return None;
        }

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    let actual = path_segments.get(i)?;
                    let eq = if self.case_sensitive {
                        *actual == lit.as_str()
                    } else {
                        actual.eq_ignore_ascii_case(lit)
                    };
                    if !eq {
                        return None;
                    }
                }
                Segment::Named { prefix, name } => {
                    let actual = path_segments.get(i)?;
                    let value = strip_prefix_segment(actual, prefix, self.case_sensitive)?;
                    params.insert(name.clone(), value.to_string());
                }
                Segment::OptionalNamed { prefix, name } => {
                    let value = match path_segments.get(i) {
                        Some(actual) => strip_prefix_segment(actual, prefix, self.case_sensitive)?,
                        None => "",
                    };
                    params.insert(name.clone(), value.to_string());
                }
                Segment::Regex { prefix, name, pattern } => {
                    let actual = path_segments.get(i)?;
                    let value = strip_prefix_segment(actual, prefix, self.case_sensitive)?;
                    if !pattern.is_match(value) {
                        return None;
                    }
                    params.insert(name.clone(), value.to_string());
                }
                Segment::Wildcard => {
                    let tail = path_segments[i..].join("/");
                    params.insert("*".to_string(), tail);
                }
            }
        }

        Some(params)
    }

    /// The first literal segment, used by the router to build the trie's
    /// top-level key; `None` when the pattern starts with a dynamic
    /// segment (these fall back to the per-node dynamic list directly).
    pub fn first_literal(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Literal(lit)) => Some(lit.as_str()),
            _ => None,
        }
    }
}
