//! Pattern overlap detection - decides whether two declared resource
//! patterns could touch the same concrete path
//!
//! The check over-approximates: a missed overlap would let two conflicting
//! tasks share a wave, so ambiguous cases answer `true`. The one exception is
//! a pattern that fails to compile as a regex, which answers `false` for that
//! single comparison and is logged.

use super::task::PatternKind;
use regex::Regex;

/// Characters that end the literal prefix of a regex pattern
const REGEX_META: &[char] = &['.', '*', '+', '?', '[', '\\', '(', '|'];

/// Characters a glob must escape to stay literal outside a character class
const GLOB_ESCAPE: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
];

/// Strategy for deciding whether two patterns may overlap
pub trait PatternMatcher {
    /// Return true if some concrete path could be matched by both patterns
    fn overlaps(&self, a: &str, a_kind: PatternKind, b: &str, b_kind: PatternKind) -> bool;

    fn name(&self) -> &str;
}

/// Prefix and wildcard heuristic over exact, regex and glob patterns
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicMatcher;

impl HeuristicMatcher {
    pub fn new() -> Self {
        Self
    }

    fn exact_vs_regex(&self, exact: &str, regex: &str) -> bool {
        // Anchored at the start only, like a prefix match
        match Regex::new(&format!("^(?:{})", regex)) {
            Ok(re) => re.is_match(exact),
            Err(e) => {
                log::warn!(
                    "Skipping comparison of '{}' against invalid regex '{}': {}",
                    exact,
                    regex,
                    e
                );
                false
            }
        }
    }

    fn regex_vs_regex(&self, a: &str, b: &str) -> bool {
        for pattern in [a, b] {
            if let Err(e) = Regex::new(pattern) {
                log::warn!(
                    "Skipping comparison of '{}' and '{}': invalid regex '{}': {}",
                    a,
                    b,
                    pattern,
                    e
                );
                return false;
            }
        }

        let prefix_a = literal_prefix(a);
        let prefix_b = literal_prefix(b);
        if prefix_a == prefix_b {
            return true;
        }

        let trimmed_a = prefix_a.trim_end_matches('/');
        let trimmed_b = prefix_b.trim_end_matches('/');

        // A pattern with no literal path in front could reach anywhere
        if trimmed_a.is_empty() || trimmed_b.is_empty() {
            return true;
        }
        if trimmed_a == trimmed_b {
            return has_deep_wildcard(a) || has_deep_wildcard(b);
        }

        // One prefix sits in a parent directory of the other
        let (short_prefix, short_pattern, long_prefix) = if trimmed_a.len() < trimmed_b.len() {
            (trimmed_a, a, trimmed_b)
        } else {
            (trimmed_b, b, trimmed_a)
        };
        if long_prefix
            .strip_prefix(short_prefix)
            .is_some_and(|rest| rest.starts_with('/'))
        {
            return has_deep_wildcard(short_pattern);
        }

        let segments_a: Vec<&str> = trimmed_a.split('/').collect();
        let segments_b: Vec<&str> = trimmed_b.split('/').collect();
        let shared = segments_a.len().min(segments_b.len());
        segments_a[..shared] == segments_b[..shared] && (a.contains(".*") || b.contains(".*"))
    }
}

impl PatternMatcher for HeuristicMatcher {
    fn overlaps(&self, a: &str, a_kind: PatternKind, b: &str, b_kind: PatternKind) -> bool {
        let (a, a_kind) = normalize(a, a_kind);
        let (b, b_kind) = normalize(b, b_kind);

        let result = match (a_kind, b_kind) {
            (PatternKind::Exact, PatternKind::Exact) => a == b,
            (PatternKind::Exact, _) => self.exact_vs_regex(&a, &b),
            (_, PatternKind::Exact) => self.exact_vs_regex(&b, &a),
            _ => self.regex_vs_regex(&a, &b),
        };

        log::trace!("overlap({}, {}) = {}", a, b, result);
        result
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Turn globs into regexes so only exact and regex patterns remain
fn normalize(pattern: &str, kind: PatternKind) -> (String, PatternKind) {
    match kind {
        PatternKind::Glob => (glob_to_regex(pattern), PatternKind::Regex),
        other => (pattern.to_string(), other),
    }
}

/// True if the pattern holds a multi-character wildcard that can cross `/`
fn has_deep_wildcard(pattern: &str) -> bool {
    pattern.contains(".*") || pattern.contains(".+")
}

/// Literal text of a regex before its first metacharacter
pub fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(REGEX_META) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}

/// Translate a glob into an equivalent regex
///
/// `**/` and `**` become `.*`, `*` becomes `[^/]*`, `?` becomes `[^/]`; every
/// other character is matched literally. Only characters with a meaning in
/// regex syntax are escaped, so `my-app/` stays part of the literal prefix.
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                }
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => {
                if GLOB_ESCAPE.contains(&other) {
                    out.push('\\');
                }
                out.push(other);
            }
        }
    }

    out
}
