use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::{Rule, substitute_user};
use crate::acl::context::{RequestContext, Verdict};
use crate::acl::ordering::RuleKind;
use crate::matcher::IndexSet;
use crate::matcher::zero_knowledge::WILDCARD;

/// Rewrites index names through regex targets. Never rejects a request.
pub struct IndicesRewriteRule {
    targets: Vec<Regex>,
    replacement: String,
}

impl IndicesRewriteRule {
    pub fn new(targets: Vec<Regex>, replacement: String) -> Self {
        Self {
            targets,
            replacement,
        }
    }

    fn rewrite(&self, indices: &IndexSet, replacement: &str) -> IndexSet {
        let rewritten: IndexSet = indices
            .iter()
            .map(|index| {
                self.targets.iter().fold(index.clone(), |current, target| {
                    target.replace_all(&current, replacement).into_owned()
                })
            })
            .collect();
        if rewritten.is_empty() {
            IndexSet::from([WILDCARD.to_string()])
        } else {
            rewritten
        }
    }
}

#[async_trait]
impl Rule for IndicesRewriteRule {
    fn kind(&self) -> RuleKind {
        RuleKind::IndicesRewrite
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        if !ctx.request().involves_indices() {
            return Ok(Verdict::Match);
        }
        let Some(replacement) = substitute_user(&self.replacement, ctx.logged_user()) else {
            debug!("index rewrite references the user but no user is logged in");
            return Ok(Verdict::Match);
        };

        let sub_requests = ctx.sub_request_indices();
        for (position, indices) in sub_requests.into_iter().enumerate() {
            let rewritten = self.rewrite(&indices, &replacement);
            if rewritten != indices {
                ctx.set_sub_request_indices(position, rewritten);
            }
        }

        let indices = ctx.indices();
        let rewritten = self.rewrite(&indices, &replacement);
        if rewritten != indices {
            ctx.set_indices(rewritten);
        }
        Ok(Verdict::Match)
    }
}

/// Hands a field-level filter to the host. Entries prefixed with `~` are denied fields.
pub struct FieldsRule {
    fields: BTreeSet<String>,
}

impl FieldsRule {
    pub fn new(fields: BTreeSet<String>) -> Self {
        Self { fields }
    }
}

#[async_trait]
impl Rule for FieldsRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Fields
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        ctx.set_field_filter(self.fields.clone());
        Ok(Verdict::Match)
    }
}
