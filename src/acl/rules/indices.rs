use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{PatternSet, Rule};
use crate::acl::context::{RequestContext, Verdict};
use crate::acl::ordering::RuleKind;
use crate::acl::request::RequestView;
use crate::matcher::zero_knowledge::{ALL_INDICES, WILDCARD};
use crate::matcher::{IndexRewrite, IndexSet, Matcher, ZeroKnowledgeFilter};

const SEARCH_ACTION: &str = "indices:data/read/search";
const MULTI_SEARCH_ACTION: &str = "indices:data/read/msearch";

/// Outcome of policing one index set.
#[derive(Debug, PartialEq, Eq)]
enum Pass {
    Allowed,
    AllowedAs(IndexSet),
    Rejected,
}

/// Restricts the indices a request may touch, narrowing read requests to the
/// permitted subset where possible.
pub struct IndicesRule {
    patterns: PatternSet,
    remote_cluster_aware: bool,
}

impl IndicesRule {
    pub fn new(patterns: PatternSet, remote_cluster_aware: bool) -> Self {
        Self {
            patterns,
            remote_cluster_aware,
        }
    }

    fn police(
        &self,
        request: &dyn RequestView,
        matcher: &Matcher,
        indices: IndexSet,
        composite: bool,
    ) -> Pass {
        let cross_cluster = self.remote_cluster_aware
            && request.is_read_request()
            && matches!(request.action(), SEARCH_ACTION | MULTI_SEARCH_ACTION)
            && indices.iter().any(|i| i.contains(':'));
        if !cross_cluster {
            return police_local(request, matcher, indices, composite);
        }

        let (remote, local): (IndexSet, IndexSet) =
            indices.into_iter().partition(|i| i.contains(':'));
        let mut merged = IndexSet::new();
        let mut changed = false;

        // A purely remote request must not be widened to every local index.
        if !local.is_empty() {
            match police_local(request, matcher, local.clone(), composite) {
                Pass::Allowed => merged.extend(local),
                Pass::AllowedAs(allowed) => {
                    merged.extend(allowed);
                    changed = true;
                }
                Pass::Rejected => return Pass::Rejected,
            }
        }

        match ZeroKnowledgeFilter::new(true).rewrite(&remote, matcher) {
            IndexRewrite::Unchanged => merged.extend(remote),
            IndexRewrite::Narrowed { indices, dropped } => {
                if !dropped.is_empty() {
                    debug!(?dropped, "dropped remote indices");
                }
                merged.extend(indices);
                changed = true;
            }
            IndexRewrite::Denied(cause) => {
                debug!(?cause, "remote indices denied");
                return Pass::Rejected;
            }
        }

        if changed {
            Pass::AllowedAs(merged)
        } else {
            Pass::Allowed
        }
    }
}

fn police_local(
    request: &dyn RequestView,
    matcher: &Matcher,
    indices: IndexSet,
    composite: bool,
) -> Pass {
    if indices.is_empty() || indices.contains(ALL_INDICES) || indices.contains(WILDCARD) {
        let allowed = matcher.filter(&request.all_indices_and_aliases());
        return if allowed.is_empty() {
            Pass::Rejected
        } else {
            Pass::AllowedAs(allowed)
        };
    }

    if !request.is_read_request() {
        return if indices.iter().all(|i| matcher.matches(i)) {
            Pass::Allowed
        } else {
            Pass::Rejected
        };
    }

    if indices.iter().all(|i| matcher.matches(i)) {
        return Pass::Allowed;
    }

    // Concrete names that do not exist make a plain request fail with a
    // not-found error on its own; composite requests skip them instead.
    let existing = request.all_indices_and_aliases();
    let missing: IndexSet = indices
        .iter()
        .filter(|i| !i.contains('*') && !existing.contains(*i))
        .cloned()
        .collect();
    let mut remaining = indices;
    if !missing.is_empty() {
        if !composite {
            return Pass::Allowed;
        }
        remaining.retain(|i| !missing.contains(i));
        if remaining.is_empty() {
            return Pass::Allowed;
        }
    }

    let expansion = request.expanded_indices(&remaining);
    if expansion.is_empty() {
        return Pass::Allowed;
    }
    let allowed = matcher.filter(&expansion);
    if allowed.is_empty() {
        Pass::Rejected
    } else {
        Pass::AllowedAs(allowed)
    }
}

#[async_trait]
impl Rule for IndicesRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Indices
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let request = ctx.request();
        if !request.involves_indices() {
            return Ok(Verdict::Match);
        }
        let matcher = self.patterns.resolve(ctx.logged_user());
        if matcher.contains_pattern(WILDCARD) {
            return Ok(Verdict::Match);
        }

        if request.is_composite() {
            for (position, indices) in ctx.sub_request_indices().into_iter().enumerate() {
                match self.police(request, &matcher, indices, true) {
                    Pass::Allowed => {}
                    Pass::AllowedAs(allowed) => ctx.set_sub_request_indices(position, allowed),
                    Pass::Rejected => return Ok(Verdict::NoMatch),
                }
            }
            return Ok(Verdict::Match);
        }

        match self.police(request, &matcher, ctx.indices(), false) {
            Pass::Allowed => Ok(Verdict::Match),
            Pass::AllowedAs(allowed) => {
                ctx.set_indices(allowed);
                Ok(Verdict::Match)
            }
            Pass::Rejected => Ok(Verdict::NoMatch),
        }
    }
}
