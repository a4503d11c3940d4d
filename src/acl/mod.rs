pub mod auth;
pub mod block;
pub mod cache;
pub mod collaborators;
pub mod compile;
pub mod context;
pub mod credentials;
pub mod ordering;
pub mod request;
pub mod rules;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::config::{BlockPolicy, Verbosity};
use crate::logging::AuditLogBuilder;

pub use block::{Block, BlockOutcome};
pub use compile::{CompileOptions, compile_config};
pub use context::{LoggedUser, Mutations, RequestContext, RuleExitResult, Verdict};
pub use request::{RequestSink, RequestView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Forbid,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Forbid => "FORBID",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BlockPolicy> for Decision {
    fn from(policy: BlockPolicy) -> Self {
        match policy {
            BlockPolicy::Allow => Decision::Allow,
            BlockPolicy::Forbid => Decision::Forbid,
        }
    }
}

/// Final answer for one request.
#[derive(Debug, Clone)]
pub struct AclOutcome {
    pub decision: Decision,
    /// Block whose rules all matched, `None` for the default deny.
    pub block: Option<Arc<str>>,
    /// Present only when the request is allowed.
    pub mutations: Option<Mutations>,
    pub history: Vec<BlockOutcome>,
    /// Default deny that the host should answer with a credentials challenge.
    pub authentication_required: bool,
}

impl AclOutcome {
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }

    pub fn logged_user(&self) -> Option<&LoggedUser> {
        self.mutations.as_ref()?.logged_user.as_ref()
    }

    /// Renders the history as `[block->[rule->true, ...]], ...`.
    pub fn history_string(&self) -> String {
        self.history
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Hands the buffered mutations to the host. Returns whether anything was committed.
    pub fn commit(self, sink: &mut dyn RequestSink) -> bool {
        match self.mutations {
            Some(mutations) if self.decision == Decision::Allow => {
                mutations.apply(sink);
                true
            }
            _ => false,
        }
    }
}

/// Ordered blocks evaluated first-match-wins. Read-only once built.
#[derive(Debug)]
pub struct Acl {
    blocks: Vec<Block>,
    prompt_for_basic_auth: bool,
}

impl Acl {
    pub fn new(blocks: Vec<Block>, prompt_for_basic_auth: bool) -> Self {
        Self {
            blocks,
            prompt_for_basic_auth,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Evaluates blocks in declaration order. Each block gets a fresh context,
    /// so state left behind by a block that did not match is discarded.
    pub async fn check(&self, request: &dyn RequestView) -> AclOutcome {
        let started = Instant::now();
        let mut history = Vec::with_capacity(self.blocks.len());

        for block in &self.blocks {
            let mut ctx = RequestContext::new(request);
            let outcome = block.evaluate(&mut ctx).await;
            let matched = outcome.matched;
            history.push(outcome);
            if !matched {
                continue;
            }

            crate::metrics::record_block_match(block.name());
            let decision = Decision::from(block.policy());
            let mutations = ctx.into_mutations();
            let user = mutations.logged_user.as_ref().map(|u| u.id.clone());
            let outcome = AclOutcome {
                decision,
                block: Some(block.name().clone()),
                mutations: (decision == Decision::Allow).then_some(mutations),
                history,
                authentication_required: false,
            };
            let quiet = decision == Decision::Allow && block.verbosity() == Verbosity::Error;
            self.finish(request, &outcome, user, started, quiet);
            return outcome;
        }

        let authentication_required =
            self.prompt_for_basic_auth && self.blocks.iter().any(Block::accepts_credentials);
        let outcome = AclOutcome {
            decision: Decision::Forbid,
            block: None,
            mutations: None,
            history,
            authentication_required,
        };
        self.finish(request, &outcome, None, started, false);
        outcome
    }

    fn finish(
        &self,
        request: &dyn RequestView,
        outcome: &AclOutcome,
        user: Option<String>,
        started: Instant,
        quiet: bool,
    ) {
        let elapsed = started.elapsed();
        crate::metrics::record_decision(outcome.decision.as_str(), elapsed);
        if quiet {
            debug!(request_id = request.id(), "allowed by quiet block; audit entry skipped");
            return;
        }

        let mut entry = AuditLogBuilder::new(request.id())
            .remote_address(request.remote_address())
            .method(request.method().as_str())
            .uri(request.uri())
            .action(request.action())
            .indices(request.indices())
            .decision(outcome.decision.as_str())
            .history(outcome.history_string())
            .elapsed(elapsed);
        if let Some(user) = user {
            entry = entry.user(user);
        }
        if let Some(block) = &outcome.block {
            entry = entry.block(block.as_ref());
        }
        entry.log();
    }
}

/// Latest published ACL. Cloned freely; each request reads one snapshot.
#[derive(Debug, Clone)]
pub struct AclStore {
    receiver: watch::Receiver<Arc<Acl>>,
}

impl AclStore {
    pub fn new(receiver: watch::Receiver<Arc<Acl>>) -> Self {
        Self { receiver }
    }

    pub fn snapshot(&self) -> Arc<Acl> {
        self.receiver.borrow().clone()
    }

    pub async fn check(&self, request: &dyn RequestView) -> AclOutcome {
        let acl = self.snapshot();
        acl.check(request).await
    }
}
