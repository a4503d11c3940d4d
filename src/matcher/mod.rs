mod pattern;
pub mod zero_knowledge;

use std::collections::BTreeSet;
use std::sync::Arc;

pub use pattern::{CaseSensitivity, Pattern};
pub use zero_knowledge::{DenyCause, IndexRewrite, ZeroKnowledgeFilter};

/// Ordered, de-duplicated set of index (or alias) names.
pub type IndexSet = BTreeSet<String>;

/// Immutable set of glob patterns evaluated under one case policy.
#[derive(Debug, Clone)]
pub struct Matcher {
    patterns: Arc<[Pattern]>,
    raw: Arc<BTreeSet<String>>,
    case: CaseSensitivity,
}

impl Matcher {
    pub fn new<I, S>(patterns: I, case: CaseSensitivity) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let raw: BTreeSet<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect();
        let compiled: Vec<Pattern> = raw.iter().map(|p| Pattern::new(p, case)).collect();
        Self {
            patterns: Arc::from(compiled.into_boxed_slice()),
            raw: Arc::new(raw),
            case,
        }
    }

    /// The configured patterns as written.
    pub fn patterns(&self) -> &BTreeSet<String> {
        &self.raw
    }

    pub fn contains_pattern(&self, pattern: &str) -> bool {
        self.raw.contains(pattern)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, value: &str) -> bool {
        self.matches_with(false, value)
    }

    /// Like [`Matcher::matches`], but a value without a cluster qualifier
    /// never matches a cluster-qualified pattern.
    pub fn matches_cluster_aware(&self, value: &str) -> bool {
        self.matches_with(true, value)
    }

    pub fn matches_with(&self, cluster_aware: bool, value: &str) -> bool {
        let normalized = self.case.normalize(value);
        let skip_remote = cluster_aware && !value.contains(':');
        self.patterns
            .iter()
            .filter(|p| !(skip_remote && p.is_cluster_qualified()))
            .any(|p| p.matches_normalized(&normalized))
    }

    /// Returns the subset of `values` matched by at least one pattern.
    pub fn filter<'a, I>(&self, values: I) -> IndexSet
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.filter_with(false, values)
    }

    pub fn filter_with<'a, I>(&self, cluster_aware: bool, values: I) -> IndexSet
    where
        I: IntoIterator<Item = &'a String>,
    {
        values
            .into_iter()
            .filter(|v| self.matches_with(cluster_aware, v))
            .cloned()
            .collect()
    }

    /// Configured patterns that the requested name, read as a pattern itself,
    /// matches. Used to widen a wildcard request into what is permitted.
    pub fn matching_patterns(&self, cluster_aware: bool, requested: &str) -> IndexSet {
        Matcher::new([requested], self.case).filter_with(cluster_aware, self.raw.iter())
    }
}
