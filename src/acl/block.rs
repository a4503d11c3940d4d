use std::fmt;
use std::sync::Arc;

use anyhow::{Result, bail, ensure};
use tracing::{debug, warn};

use super::context::{RequestContext, RuleExitResult, Verdict};
use super::rules::Rule;
use crate::config::{BlockPolicy, Verbosity};

/// Ordered rules plus the policy applied when all of them match.
pub struct Block {
    name: Arc<str>,
    policy: BlockPolicy,
    verbosity: Verbosity,
    rules: Vec<Box<dyn Rule>>,
}

/// Result of evaluating one block against one request.
#[derive(Debug, Clone)]
pub struct BlockOutcome {
    pub block: Arc<str>,
    pub matched: bool,
    pub history: Vec<RuleExitResult>,
}

impl fmt::Display for BlockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}->[", self.block)?;
        for (idx, entry) in self.history.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{entry}")?;
        }
        f.write_str("]]")
    }
}

impl Block {
    /// Sorts `rules` into evaluation order and rejects blocks that authorize
    /// without authenticating.
    pub fn new(
        name: Arc<str>,
        policy: BlockPolicy,
        verbosity: Verbosity,
        mut rules: Vec<Box<dyn Rule>>,
    ) -> Result<Self> {
        ensure!(!rules.is_empty(), "block '{}' must contain at least one rule", name);
        rules.sort_by_key(|r| r.kind().rank());

        let authenticates = rules.iter().any(|r| r.kind().is_authentication());
        if let Some(authz) = rules.iter().find(|r| r.kind().is_authorization())
            && !authenticates
        {
            bail!(
                "block '{}' has authorization rule '{}' but no authentication rule",
                name,
                authz.name()
            );
        }

        Ok(Self {
            name,
            policy,
            verbosity,
            rules,
        })
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn policy(&self) -> BlockPolicy {
        self.policy
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name())
    }

    pub fn accepts_credentials(&self) -> bool {
        self.rules.iter().any(|r| r.kind().is_authentication())
    }

    /// Runs the rules in order, stopping at the first one that does not match.
    pub async fn evaluate(&self, ctx: &mut RequestContext<'_>) -> BlockOutcome {
        let mut history = Vec::with_capacity(self.rules.len());
        let mut matched = true;
        for rule in &self.rules {
            let verdict = match rule.check(ctx).await {
                Ok(verdict) => verdict,
                Err(err) => {
                    warn!(
                        block = %self.name,
                        rule = rule.name(),
                        error = ?err,
                        "rule evaluation failed; treating as no match"
                    );
                    crate::metrics::record_rule_failure(rule.name());
                    Verdict::NoMatch
                }
            };
            history.push(RuleExitResult {
                rule: Arc::from(rule.name()),
                matched: verdict.is_match(),
            });
            if !verdict.is_match() {
                matched = false;
                break;
            }
        }
        debug!(block = %self.name, matched, "block evaluated");
        BlockOutcome {
            block: self.name.clone(),
            matched,
            history,
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("rules", &self.rule_names().collect::<Vec<_>>())
            .finish()
    }
}
