use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

/// Case policy applied to both sides of a comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseSensitivity {
    #[default]
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    pub fn normalize<'a>(self, value: &'a str) -> Cow<'a, str> {
        match self {
            CaseSensitivity::Sensitive => Cow::Borrowed(value),
            CaseSensitivity::Insensitive => Cow::Owned(value.to_lowercase()),
        }
    }
}

/// A single configured glob. `*` is the only special character and matches
/// any run of characters, including none.
#[derive(Clone)]
pub struct Pattern {
    raw: Arc<str>,
    tokens: Arc<[Box<str>]>,
}

impl Pattern {
    pub fn new(raw: &str, case: CaseSensitivity) -> Self {
        let normalized = case.normalize(raw);
        Self {
            raw: Arc::from(raw),
            tokens: Arc::from(tokenize(&normalized).into_boxed_slice()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Patterns that name a remote cluster (`cluster:index`).
    pub fn is_cluster_qualified(&self) -> bool {
        self.raw.contains(':')
    }

    /// `value` must already be normalized with the policy the pattern was built with.
    pub fn matches_normalized(&self, value: &str) -> bool {
        glob_match(&self.tokens, value)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.raw).finish()
    }
}

/// Splits on runs of `*`, keeping the empty leading/trailing segments so that
/// `"*"` becomes `["", ""]` and `"a*"` becomes `["a", ""]`.
fn tokenize(pattern: &str) -> Vec<Box<str>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_star_run = false;
    for ch in pattern.chars() {
        if ch == '*' {
            if !in_star_run {
                tokens.push(std::mem::take(&mut current).into_boxed_str());
                in_star_run = true;
            }
        } else {
            current.push(ch);
            in_star_run = false;
        }
    }
    tokens.push(current.into_boxed_str());
    tokens
}

/// First-fit forward scan. Interior tokens are located left to right without
/// backtracking; the last token is only checked as a suffix.
fn glob_match(tokens: &[Box<str>], value: &str) -> bool {
    match tokens {
        [] => value.is_empty(),
        [only] => value == only.as_ref(),
        [first, middle @ .., last] => {
            if !value.starts_with(first.as_ref()) {
                return false;
            }
            let mut idx = first.len();
            for token in middle {
                match value[idx..].find(token.as_ref()) {
                    Some(pos) => idx += pos + token.len(),
                    None => return false,
                }
            }
            value.ends_with(last.as_ref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, value: &str) -> bool {
        Pattern::new(pattern, CaseSensitivity::Sensitive).matches_normalized(value)
    }

    #[test]
    fn tokenizes_star_runs() {
        let tokens = tokenize("a**b*");
        let tokens: Vec<&str> = tokens.iter().map(|t| t.as_ref()).collect();
        assert_eq!(tokens, vec!["a", "b", ""]);
        assert_eq!(tokenize("*").len(), 2);
        assert_eq!(tokenize("plain").len(), 1);
    }

    #[test]
    fn literal_pattern_is_exact() {
        assert!(matches("logs", "logs"));
        assert!(!matches("logs", "logs-1"));
        assert!(!matches("logs", "Logs"));
    }

    #[test]
    fn star_matches_everything() {
        assert!(matches("*", ""));
        assert!(matches("*", "anything"));
        assert!(matches("**", "anything"));
    }

    #[test]
    fn prefix_suffix_and_interior() {
        assert!(matches("logstash-*", "logstash-2024.01.01"));
        assert!(matches("logstash-*", "logstash-"));
        assert!(!matches("logstash-*", "logs"));
        assert!(matches("*-prod", "billing-prod"));
        assert!(matches("a*b*c", "axxbyyc"));
        assert!(!matches("a*b*c", "axxcyyb"));
        assert!(matches("*mid*", "has-mid-part"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(matches("a.b", "a.b"));
        assert!(!matches("a.b", "axb"));
        assert!(matches("x?(y)*", "x?(y)z"));
        assert!(!matches("x?(y)*", "x(y)z"));
    }

    #[test]
    fn empty_pattern_matches_only_empty_value() {
        assert!(matches("", ""));
        assert!(!matches("", "a"));
    }

    #[test]
    fn insensitive_pattern_lowercases_tokens() {
        let pattern = Pattern::new("Logs-*", CaseSensitivity::Insensitive);
        assert!(pattern.matches_normalized("logs-a"));
        assert_eq!(pattern.as_str(), "Logs-*");
    }
}
