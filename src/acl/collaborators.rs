//! External systems rules may consult. Implementations are supplied by the
//! host and registered by name; ACL documents refer to them by that name.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

pub type GroupSet = BTreeSet<String>;

/// Claims of a verified token.
pub type Claims = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub id: String,
    pub dn: String,
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn find_user(&self, id: &str) -> Result<Option<DirectoryUser>>;

    /// Attempts a bind as `user`. `Ok(false)` means the directory rejected the secret.
    async fn bind(&self, user: &DirectoryUser, secret: &str) -> Result<bool>;

    async fn groups_of(&self, user: &DirectoryUser) -> Result<GroupSet>;
}

#[async_trait]
pub trait ExternalAuthService: Send + Sync {
    async fn authenticate(&self, user: &str, secret: &str) -> Result<bool>;
}

#[async_trait]
pub trait GroupsProvider: Send + Sync {
    async fn groups_for(&self, user: &str) -> Result<GroupSet>;
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `Ok(None)` for a token that is well formed but not valid.
    async fn verify(&self, token: &str) -> Result<Option<Claims>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} '{name}'")]
pub struct UnknownCollaborator {
    pub kind: &'static str,
    pub name: String,
}

/// Registry of named collaborators available to the rule factory.
#[derive(Clone, Default)]
pub struct Collaborators {
    directories: HashMap<String, Arc<dyn DirectoryClient>>,
    auth_services: HashMap<String, Arc<dyn ExternalAuthService>>,
    group_providers: HashMap<String, Arc<dyn GroupsProvider>>,
    token_verifiers: HashMap<String, Arc<dyn TokenVerifier>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(mut self, name: impl Into<String>, client: Arc<dyn DirectoryClient>) -> Self {
        self.directories.insert(name.into(), client);
        self
    }

    pub fn with_auth_service(
        mut self,
        name: impl Into<String>,
        service: Arc<dyn ExternalAuthService>,
    ) -> Self {
        self.auth_services.insert(name.into(), service);
        self
    }

    pub fn with_groups_provider(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn GroupsProvider>,
    ) -> Self {
        self.group_providers.insert(name.into(), provider);
        self
    }

    pub fn with_token_verifier(
        mut self,
        name: impl Into<String>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        self.token_verifiers.insert(name.into(), verifier);
        self
    }

    pub fn directory(&self, name: &str) -> Result<Arc<dyn DirectoryClient>, UnknownCollaborator> {
        lookup(&self.directories, "directory", name)
    }

    pub fn auth_service(&self, name: &str) -> Result<Arc<dyn ExternalAuthService>, UnknownCollaborator> {
        lookup(&self.auth_services, "authentication service", name)
    }

    pub fn groups_provider(&self, name: &str) -> Result<Arc<dyn GroupsProvider>, UnknownCollaborator> {
        lookup(&self.group_providers, "groups provider", name)
    }

    pub fn token_verifier(&self, name: &str) -> Result<Arc<dyn TokenVerifier>, UnknownCollaborator> {
        lookup(&self.token_verifiers, "token verifier", name)
    }
}

fn lookup<T: ?Sized>(
    map: &HashMap<String, Arc<T>>,
    kind: &'static str,
    name: &str,
) -> Result<Arc<T>, UnknownCollaborator> {
    map.get(name).cloned().ok_or_else(|| UnknownCollaborator {
        kind,
        name: name.to_string(),
    })
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("directories", &self.directories.keys().collect::<Vec<_>>())
            .field("auth_services", &self.auth_services.keys().collect::<Vec<_>>())
            .field("group_providers", &self.group_providers.keys().collect::<Vec<_>>())
            .field("token_verifiers", &self.token_verifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}
