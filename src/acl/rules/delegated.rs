//! Rules that hand the decision to an external collaborator.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{Rule, basic_credentials};
use crate::acl::auth::{Authenticator, Authorizer};
use crate::acl::collaborators::GroupSet;
use crate::acl::context::{LoggedUser, RequestContext, Verdict};
use crate::acl::ordering::RuleKind;

pub struct AuthenticationRule {
    kind: RuleKind,
    authenticator: Arc<dyn Authenticator>,
}

impl AuthenticationRule {
    pub fn new(kind: RuleKind, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            kind,
            authenticator,
        }
    }
}

#[async_trait]
impl Rule for AuthenticationRule {
    fn kind(&self) -> RuleKind {
        self.kind
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let Some(creds) = basic_credentials(ctx) else {
            return Ok(Verdict::NoMatch);
        };
        if !self
            .authenticator
            .authenticate(creds.user(), creds.secret())
            .await?
        {
            return Ok(Verdict::NoMatch);
        }
        ctx.set_logged_user(LoggedUser::new(creds.user()));
        Ok(Verdict::Match)
    }
}

/// Requires a logged user belonging to at least one of `groups`.
pub struct AuthorizationRule {
    kind: RuleKind,
    groups: GroupSet,
    authorizer: Arc<dyn Authorizer>,
}

impl AuthorizationRule {
    pub fn new(kind: RuleKind, groups: GroupSet, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            kind,
            groups,
            authorizer,
        }
    }
}

#[async_trait]
impl Rule for AuthorizationRule {
    fn kind(&self) -> RuleKind {
        self.kind
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let Some(user) = ctx.logged_user() else {
            return Ok(Verdict::NoMatch);
        };
        let authorized = self.authorizer.authorize(&user.id, &self.groups).await?;
        Ok(Verdict::from_bool(authorized))
    }
}
