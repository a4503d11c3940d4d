use anyhow::Result;
use async_trait::async_trait;

use super::{Rule, basic_credentials};
use crate::acl::collaborators::GroupSet;
use crate::acl::context::{LoggedUser, RequestContext, Verdict};
use crate::acl::credentials::BasicCredentials;
use crate::acl::ordering::RuleKind;
use crate::config::{LocalCredential, UserDefinition};

/// Request header selecting which of the caller's groups to act as.
pub const CURRENT_GROUP_HEADER: &str = "x-current-group";
/// Response header listing the groups the caller may select.
pub const AVAILABLE_GROUPS_HEADER: &str = "x-available-groups";

/// Authenticates against the locally defined users and requires membership
/// in one of the rule's groups.
pub struct GroupsRule {
    groups: GroupSet,
    users: Vec<UserDefinition>,
}

impl GroupsRule {
    pub fn new(groups: GroupSet, users: &[UserDefinition]) -> Self {
        let users = users
            .iter()
            .filter(|u| !u.groups.is_disjoint(&groups))
            .cloned()
            .collect();
        Self { groups, users }
    }
}

fn credential_matches(credential: &LocalCredential, creds: &BasicCredentials) -> bool {
    match credential {
        LocalCredential::AuthKey(expected) => creds.joined().as_str() == expected.as_ref(),
        LocalCredential::AuthKeySha256(digest) => creds.sha256_hex() == digest.as_ref(),
    }
}

#[async_trait]
impl Rule for GroupsRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Groups
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let Some(creds) = basic_credentials(ctx) else {
            return Ok(Verdict::NoMatch);
        };
        let Some(user) = self
            .users
            .iter()
            .find(|u| u.username.as_ref() == creds.user() && credential_matches(&u.credential, &creds))
        else {
            return Ok(Verdict::NoMatch);
        };

        let available: GroupSet = user.groups.intersection(&self.groups).cloned().collect();
        let current = match ctx.request().header(CURRENT_GROUP_HEADER) {
            Some(preferred) if available.contains(preferred) => preferred.to_string(),
            Some(_) => return Ok(Verdict::NoMatch),
            None => match available.iter().next() {
                Some(first) => first.clone(),
                None => return Ok(Verdict::NoMatch),
            },
        };

        let listing = available.iter().cloned().collect::<Vec<_>>().join(",");
        ctx.set_response_header(AVAILABLE_GROUPS_HEADER, listing);
        ctx.set_logged_user(LoggedUser {
            id: creds.user().to_string(),
            current_group: Some(current),
            available_groups: available,
        });
        Ok(Verdict::Match)
    }
}
