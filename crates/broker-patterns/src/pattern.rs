// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! Pattern compilation and specificity ordering.
//!
//! A pattern is a dotted sequence of tokens. `*` matches exactly one token;
//! `#` matches zero or more tokens. Patterns are compiled once, at
//! registration time, into an anchored [`regex::Regex`] plus a lightweight
//! token classification used only by the specificity comparator (the regex
//! itself has no notion of "more specific than another regex").

use std::cmp::Ordering;

use regex::Regex;

use crate::error::PatternError;

/// The multi-word wildcard token text.
pub const MULTI_WILDCARD: &str = "#";
/// The single-word wildcard token text.
pub const SINGLE_WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Literal,
    Single,
    Multi,
}

/// A compiled pattern: the original text, its anchored matcher, and the
/// per-token classification the specificity comparator needs.
#[derive(Debug, Clone)]
pub struct Pattern {
    text: String,
    tokens: Vec<TokenKind>,
    regex: Regex,
}

impl Pattern {
    /// Compile `text` into a matchable, orderable pattern.
    pub fn compile(text: &str) -> Result<Self, PatternError> {
        if text.is_empty() {
            return Err(invalid(text, "pattern must not be empty"));
        }

        let raw_tokens: Vec<&str> = text.split('.').collect();
        let mut tokens = Vec::with_capacity(raw_tokens.len());
        let mut regex_src = String::with_capacity(text.len() + 8);
        regex_src.push('^');

        for (i, raw) in raw_tokens.iter().enumerate() {
            if raw.is_empty() {
                return Err(invalid(text, "tokens must not be empty (stray '.')"));
            }
            if i > 0 {
                regex_src.push_str("\\.");
            }
            match *raw {
                SINGLE_WILDCARD => {
                    tokens.push(TokenKind::Single);
                    regex_src.push_str("[^.]+");
                }
                MULTI_WILDCARD => {
                    tokens.push(TokenKind::Multi);
                    regex_src.push_str(".*");
                }
                lit if lit.contains('*') || lit.contains('#') => {
                    return Err(invalid(
                        text,
                        "wildcard tokens must not be mixed with literal characters",
                    ));
                }
                lit => {
                    tokens.push(TokenKind::Literal);
                    regex_src.push_str(&regex::escape(lit));
                }
            }
        }
        regex_src.push('$');

        let regex = Regex::new(&regex_src)
            .map_err(|e| invalid(text, format!("regex compilation failed: {e}")))?;

        Ok(Self {
            text: text.to_string(),
            tokens,
            regex,
        })
    }

    /// Pattern text as registered.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether `key` satisfies this pattern.
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    fn has_multi(&self) -> bool {
        self.tokens.iter().any(|t| *t == TokenKind::Multi)
    }

    fn has_single(&self) -> bool {
        self.tokens.iter().any(|t| *t == TokenKind::Single)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}
impl Eq for Pattern {}

fn invalid(pattern: &str, reason: impl Into<String>) -> PatternError {
    PatternError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

/// Order two patterns by specificity.
///
/// Returns [`Ordering::Less`] when `a` is **less** specific than `b`, so
/// sorting a slice of matching patterns with this comparator yields them
/// least-specific-first — the order the repository's merge reduction walks.
///
/// Rule 4 (the token-by-token single-wildcard scan) stops at the first
/// position where exactly one side has `*`; it does not keep scanning for a
/// "better" differentiator further down the pattern. That truncation is
/// inherited from the source decision this repository is modeled on and is
/// kept intentionally rather than "fixed" into an exhaustive scan.
pub fn specificity_cmp(a: &Pattern, b: &Pattern) -> Ordering {
    let (a_multi, b_multi) = (a.has_multi(), b.has_multi());
    if a_multi != b_multi {
        return if a_multi { Ordering::Less } else { Ordering::Greater };
    }
    if a_multi {
        // both carry '#': longer pattern (more tokens) is more specific
        return a.tokens.len().cmp(&b.tokens.len());
    }

    let (a_single, b_single) = (a.has_single(), b.has_single());
    if a_single != b_single {
        return if a_single {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }

    if a_single {
        for (ta, tb) in a.tokens.iter().zip(b.tokens.iter()) {
            let a_is_star = *ta == TokenKind::Single;
            let b_is_star = *tb == TokenKind::Single;
            if a_is_star != b_is_star {
                return if a_is_star {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
            }
        }
    }

    a.tokens.len().cmp(&b.tokens.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_literal_pattern() {
        let p = Pattern::compile("foo.bar").unwrap();
        assert!(p.matches("foo.bar"));
        assert!(!p.matches("foo.baz"));
        assert!(!p.matches("foo.bar.baz"));
    }

    #[test]
    fn single_wildcard_matches_one_token() {
        let p = Pattern::compile("foo.*").unwrap();
        assert!(p.matches("foo.bar"));
        assert!(!p.matches("foo.bar.baz"));
        assert!(!p.matches("foo"));
    }

    #[test]
    fn multi_wildcard_matches_zero_or_more() {
        let p = Pattern::compile("foo.#").unwrap();
        assert!(p.matches("foo.bar.baz"));
        assert!(p.matches("foo."));
    }

    #[test]
    fn catch_all_matches_anything() {
        let p = Pattern::compile("#").unwrap();
        assert!(p.matches("anything.at.all"));
        assert!(p.matches(""));
    }

    #[test]
    fn rejects_empty_and_stray_dots() {
        assert!(Pattern::compile("").is_err());
        assert!(Pattern::compile("foo..bar").is_err());
        assert!(Pattern::compile("foo.*bar").is_err());
    }

    #[test]
    fn exact_beats_single_beats_multi() {
        let exact = Pattern::compile("foo.bar").unwrap();
        let single = Pattern::compile("*.bar").unwrap();
        let multi = Pattern::compile("#").unwrap();

        assert_eq!(specificity_cmp(&multi, &single), Ordering::Less);
        assert_eq!(specificity_cmp(&single, &exact), Ordering::Less);
        assert_eq!(specificity_cmp(&multi, &exact), Ordering::Less);
    }

    #[test]
    fn longer_multi_pattern_is_more_specific() {
        let short = Pattern::compile("foo.#").unwrap();
        let long = Pattern::compile("foo.bar.#").unwrap();
        assert_eq!(specificity_cmp(&short, &long), Ordering::Less);
    }

    #[test]
    fn single_wildcard_position_truncates_at_first_difference() {
        // First token differs (literal vs '*') -> decided immediately,
        // the second token's wildcard-ness is never consulted.
        let a = Pattern::compile("foo.*").unwrap();
        let b = Pattern::compile("*.bar").unwrap();
        assert_eq!(specificity_cmp(&a, &b), Ordering::Greater);
    }
}
