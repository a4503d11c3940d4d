//! Rewrites a requested index set into the largest subset (or widening) the
//! caller is permitted to see, without consulting the store. Names that are
//! not permitted are dropped silently, so a caller cannot learn whether they
//! exist.

use super::{IndexSet, Matcher};

pub const ALL_INDICES: &str = "_all";
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRewrite {
    /// The request is already within the permitted set.
    Unchanged,
    /// The request must be replaced by `indices`. `dropped` lists requested
    /// names that were removed, for audit only.
    Narrowed { indices: IndexSet, dropped: IndexSet },
    /// Nothing permitted remains; the request must be denied.
    Denied(DenyCause),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyCause {
    /// Everything was requested but no pattern applies to this cluster scope.
    NothingPermitted,
    /// Every requested name was dropped.
    AllDropped(IndexSet),
}

#[derive(Debug, Clone, Copy)]
pub struct ZeroKnowledgeFilter {
    cluster_aware: bool,
}

impl ZeroKnowledgeFilter {
    pub fn new(cluster_aware: bool) -> Self {
        Self { cluster_aware }
    }

    pub fn rewrite(&self, requested: &IndexSet, matcher: &Matcher) -> IndexRewrite {
        let mut indices = requested.clone();
        if indices.remove(ALL_INDICES) {
            indices.insert(WILDCARD.to_string());
        }
        if indices.is_empty() {
            indices.insert(WILDCARD.to_string());
        }

        let mut must_replace = false;
        if indices.contains(WILDCARD) {
            if !self.cluster_aware {
                return finish_star(matcher.patterns().clone());
            }
            let local = local_patterns(matcher);
            if indices.len() == 1 {
                return finish_star(local);
            }
            indices.remove(WILDCARD);
            indices.extend(local);
            must_replace = true;
        }

        let mut rewritten = IndexSet::new();
        let mut dropped = IndexSet::new();
        for index in &indices {
            if matcher.matches_with(self.cluster_aware, index) {
                rewritten.insert(index.clone());
                continue;
            }
            let widened = matcher.matching_patterns(self.cluster_aware, index);
            if widened.is_empty() {
                dropped.insert(index.clone());
            } else {
                rewritten.extend(widened);
                must_replace = true;
            }
        }

        if rewritten.is_empty() {
            return IndexRewrite::Denied(DenyCause::AllDropped(dropped));
        }
        if must_replace || rewritten != *requested {
            IndexRewrite::Narrowed {
                indices: rewritten,
                dropped,
            }
        } else {
            IndexRewrite::Unchanged
        }
    }

    /// Applies the rewrite in place. Returns `false` when the request must be denied.
    pub fn apply(&self, indices: &mut IndexSet, matcher: &Matcher) -> bool {
        match self.rewrite(indices, matcher) {
            IndexRewrite::Unchanged => true,
            IndexRewrite::Narrowed { indices: next, .. } => {
                *indices = next;
                true
            }
            IndexRewrite::Denied(_) => false,
        }
    }
}

fn local_patterns(matcher: &Matcher) -> IndexSet {
    matcher
        .patterns()
        .iter()
        .filter(|p| !p.contains(':'))
        .cloned()
        .collect()
}

fn finish_star(patterns: IndexSet) -> IndexRewrite {
    if patterns.is_empty() {
        IndexRewrite::Denied(DenyCause::NothingPermitted)
    } else {
        IndexRewrite::Narrowed {
            indices: patterns,
            dropped: IndexSet::new(),
        }
    }
}
