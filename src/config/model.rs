use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderName, Method};
use regex::Regex;
use serde::Deserialize;

use crate::acl::ordering::RuleKind;
use crate::util::IpOrCidr;

#[derive(Debug, Clone)]
pub struct AclConfig {
    pub blocks: Vec<BlockConfig>,
    pub users: Vec<UserDefinition>,
}

#[derive(Debug, Clone)]
pub struct BlockConfig {
    pub name: Arc<str>,
    pub policy: BlockPolicy,
    pub verbosity: Verbosity,
    pub rules: Vec<RuleSettings>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockPolicy {
    #[default]
    Allow,
    Forbid,
}

/// Controls whether allowed requests matched by the block are audit-logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Info,
    Error,
}

/// Local account usable by the `groups` rule.
#[derive(Debug, Clone)]
pub struct UserDefinition {
    pub username: Arc<str>,
    pub credential: LocalCredential,
    pub groups: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub enum LocalCredential {
    /// `user:secret`
    AuthKey(Arc<str>),
    /// Lowercase hex SHA-256 of `user:secret`.
    AuthKeySha256(Arc<str>),
}

#[derive(Debug, Clone)]
pub enum HostSpec {
    Address(IpOrCidr),
    Name(Arc<str>),
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub verifier: Arc<str>,
    pub header: HeaderName,
    pub user_claim: Option<String>,
    pub roles_claim: Option<String>,
    pub roles: BTreeSet<String>,
}

/// Validated payload of one configured rule.
#[derive(Debug, Clone)]
pub enum RuleSettings {
    AuthKey {
        credentials: Arc<str>,
    },
    AuthKeySha256 {
        digest: Arc<str>,
    },
    ProxyAuth {
        users: Vec<String>,
        user_id_header: HeaderName,
    },
    JwtAuth(JwtSettings),
    LdapAuthentication {
        directory: Arc<str>,
        cache_ttl: Duration,
    },
    ExternalAuthentication {
        service: Arc<str>,
        cache_ttl: Duration,
    },
    Groups {
        groups: BTreeSet<String>,
    },
    Hosts {
        hosts: Vec<HostSpec>,
        accept_x_forwarded_for: bool,
    },
    Methods {
        methods: Vec<Method>,
    },
    UriRe {
        patterns: Vec<Regex>,
    },
    MaxBodyLength {
        max: usize,
    },
    Headers {
        required: Vec<String>,
    },
    Users {
        patterns: Vec<String>,
    },
    Indices {
        patterns: Vec<String>,
    },
    Actions {
        patterns: Vec<String>,
    },
    LdapAuthorization {
        directory: Arc<str>,
        groups: BTreeSet<String>,
        cache_ttl: Duration,
    },
    GroupsProviderAuthorization {
        provider: Arc<str>,
        groups: BTreeSet<String>,
        cache_ttl: Duration,
    },
    IndicesRewrite {
        targets: Vec<Regex>,
        replacement: String,
    },
    Fields {
        fields: BTreeSet<String>,
    },
}

impl RuleSettings {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleSettings::AuthKey { .. } => RuleKind::AuthKey,
            RuleSettings::AuthKeySha256 { .. } => RuleKind::AuthKeySha256,
            RuleSettings::ProxyAuth { .. } => RuleKind::ProxyAuth,
            RuleSettings::JwtAuth(_) => RuleKind::JwtAuth,
            RuleSettings::LdapAuthentication { .. } => RuleKind::LdapAuthentication,
            RuleSettings::ExternalAuthentication { .. } => RuleKind::ExternalAuthentication,
            RuleSettings::Groups { .. } => RuleKind::Groups,
            RuleSettings::Hosts { .. } => RuleKind::Hosts,
            RuleSettings::Methods { .. } => RuleKind::Methods,
            RuleSettings::UriRe { .. } => RuleKind::UriRe,
            RuleSettings::MaxBodyLength { .. } => RuleKind::MaxBodyLength,
            RuleSettings::Headers { .. } => RuleKind::Headers,
            RuleSettings::Users { .. } => RuleKind::Users,
            RuleSettings::Indices { .. } => RuleKind::Indices,
            RuleSettings::Actions { .. } => RuleKind::Actions,
            RuleSettings::LdapAuthorization { .. } => RuleKind::LdapAuthorization,
            RuleSettings::GroupsProviderAuthorization { .. } => {
                RuleKind::GroupsProviderAuthorization
            }
            RuleSettings::IndicesRewrite { .. } => RuleKind::IndicesRewrite,
            RuleSettings::Fields { .. } => RuleKind::Fields,
        }
    }
}
