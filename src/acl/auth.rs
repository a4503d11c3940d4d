use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::collaborators::{DirectoryClient, ExternalAuthService, GroupSet, GroupsProvider};
use crate::util::timeout_with_context;

/// Checks a username/secret pair.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, user: &str, secret: &str) -> Result<bool>;
}

/// Checks whether `user` belongs to at least one of `groups`.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, user: &str, groups: &GroupSet) -> Result<bool>;
}

pub struct DirectoryAuthenticator {
    name: Arc<str>,
    client: Arc<dyn DirectoryClient>,
    timeout: Duration,
}

impl DirectoryAuthenticator {
    pub fn new(name: Arc<str>, client: Arc<dyn DirectoryClient>, timeout: Duration) -> Self {
        Self {
            name,
            client,
            timeout,
        }
    }
}

#[async_trait]
impl Authenticator for DirectoryAuthenticator {
    async fn authenticate(&self, user: &str, secret: &str) -> Result<bool> {
        let client = self.client.clone();
        timeout_with_context(
            self.timeout,
            async move {
                match client.find_user(user).await? {
                    Some(found) => client.bind(&found, secret).await,
                    None => Ok(false),
                }
            },
            format!("authenticating against directory '{}'", self.name),
        )
        .await
    }
}

pub struct DirectoryAuthorizer {
    name: Arc<str>,
    client: Arc<dyn DirectoryClient>,
    timeout: Duration,
}

impl DirectoryAuthorizer {
    pub fn new(name: Arc<str>, client: Arc<dyn DirectoryClient>, timeout: Duration) -> Self {
        Self {
            name,
            client,
            timeout,
        }
    }
}

#[async_trait]
impl Authorizer for DirectoryAuthorizer {
    async fn authorize(&self, user: &str, groups: &GroupSet) -> Result<bool> {
        let client = self.client.clone();
        timeout_with_context(
            self.timeout,
            async move {
                let Some(found) = client.find_user(user).await? else {
                    return Ok(false);
                };
                let member_of = client.groups_of(&found).await?;
                Ok(!member_of.is_disjoint(groups))
            },
            format!("resolving groups in directory '{}'", self.name),
        )
        .await
    }
}

pub struct ServiceAuthenticator {
    name: Arc<str>,
    service: Arc<dyn ExternalAuthService>,
    timeout: Duration,
}

impl ServiceAuthenticator {
    pub fn new(name: Arc<str>, service: Arc<dyn ExternalAuthService>, timeout: Duration) -> Self {
        Self {
            name,
            service,
            timeout,
        }
    }
}

#[async_trait]
impl Authenticator for ServiceAuthenticator {
    async fn authenticate(&self, user: &str, secret: &str) -> Result<bool> {
        timeout_with_context(
            self.timeout,
            self.service.authenticate(user, secret),
            format!("calling authentication service '{}'", self.name),
        )
        .await
    }
}

pub struct ProviderAuthorizer {
    name: Arc<str>,
    provider: Arc<dyn GroupsProvider>,
    timeout: Duration,
}

impl ProviderAuthorizer {
    pub fn new(name: Arc<str>, provider: Arc<dyn GroupsProvider>, timeout: Duration) -> Self {
        Self {
            name,
            provider,
            timeout,
        }
    }
}

#[async_trait]
impl Authorizer for ProviderAuthorizer {
    async fn authorize(&self, user: &str, groups: &GroupSet) -> Result<bool> {
        let member_of = timeout_with_context(
            self.timeout,
            self.provider.groups_for(user),
            format!("calling groups provider '{}'", self.name),
        )
        .await?;
        Ok(!member_of.is_disjoint(groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::collaborators::DirectoryUser;

    struct StaticDirectory;

    #[async_trait]
    impl DirectoryClient for StaticDirectory {
        async fn find_user(&self, id: &str) -> Result<Option<DirectoryUser>> {
            Ok((id == "alice").then(|| DirectoryUser {
                id: id.to_string(),
                dn: "uid=alice,ou=people".to_string(),
            }))
        }

        async fn bind(&self, user: &DirectoryUser, secret: &str) -> Result<bool> {
            Ok(user.dn == "uid=alice,ou=people" && secret == "pw")
        }

        async fn groups_of(&self, _user: &DirectoryUser) -> Result<GroupSet> {
            Ok(["ops".to_string()].into_iter().collect())
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl GroupsProvider for SlowProvider {
        async fn groups_for(&self, _user: &str) -> Result<GroupSet> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GroupSet::new())
        }
    }

    fn groups(items: &[&str]) -> GroupSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn directory_authenticates_by_bind() {
        let auth =
            DirectoryAuthenticator::new(Arc::from("corp"), Arc::new(StaticDirectory), Duration::from_secs(1));
        assert!(auth.authenticate("alice", "pw").await.unwrap());
        assert!(!auth.authenticate("alice", "nope").await.unwrap());
        assert!(!auth.authenticate("mallory", "pw").await.unwrap());
    }

    #[tokio::test]
    async fn directory_authorizes_on_group_intersection() {
        let authz =
            DirectoryAuthorizer::new(Arc::from("corp"), Arc::new(StaticDirectory), Duration::from_secs(1));
        assert!(authz.authorize("alice", &groups(&["ops", "dev"])).await.unwrap());
        assert!(!authz.authorize("alice", &groups(&["dev"])).await.unwrap());
        assert!(!authz.authorize("mallory", &groups(&["ops"])).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let authz =
            ProviderAuthorizer::new(Arc::from("groups-api"), Arc::new(SlowProvider), Duration::from_secs(1));
        let err = authz.authorize("alice", &groups(&["ops"])).await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "unexpected error: {err}");
    }
}
