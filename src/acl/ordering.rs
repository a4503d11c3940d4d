use std::fmt;

/// Closed set of rule kinds. Adding a variant forces a decision about its
/// phase and rank through the exhaustive matches below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    AuthKey,
    AuthKeySha256,
    ProxyAuth,
    JwtAuth,
    LdapAuthentication,
    ExternalAuthentication,
    Groups,
    Hosts,
    Methods,
    UriRe,
    MaxBodyLength,
    Headers,
    Users,
    Indices,
    Actions,
    LdapAuthorization,
    GroupsProviderAuthorization,
    IndicesRewrite,
    Fields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Authentication,
    SlowAuthentication,
    Inspection,
    IndexScoping,
    Authorization,
    Mutation,
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::AuthKey => "auth_key",
            RuleKind::AuthKeySha256 => "auth_key_sha256",
            RuleKind::ProxyAuth => "proxy_auth",
            RuleKind::JwtAuth => "jwt_auth",
            RuleKind::LdapAuthentication => "ldap_authentication",
            RuleKind::ExternalAuthentication => "external_authentication",
            RuleKind::Groups => "groups",
            RuleKind::Hosts => "hosts",
            RuleKind::Methods => "methods",
            RuleKind::UriRe => "uri_re",
            RuleKind::MaxBodyLength => "max_body_length",
            RuleKind::Headers => "headers",
            RuleKind::Users => "users",
            RuleKind::Indices => "indices",
            RuleKind::Actions => "actions",
            RuleKind::LdapAuthorization => "ldap_authorization",
            RuleKind::GroupsProviderAuthorization => "groups_provider_authorization",
            RuleKind::IndicesRewrite => "indices_rewrite",
            RuleKind::Fields => "fields",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            RuleKind::AuthKey | RuleKind::AuthKeySha256 | RuleKind::ProxyAuth | RuleKind::JwtAuth => {
                Phase::Authentication
            }
            RuleKind::LdapAuthentication | RuleKind::ExternalAuthentication | RuleKind::Groups => {
                Phase::SlowAuthentication
            }
            RuleKind::Hosts
            | RuleKind::Methods
            | RuleKind::UriRe
            | RuleKind::MaxBodyLength
            | RuleKind::Headers
            | RuleKind::Users => Phase::Inspection,
            RuleKind::Indices | RuleKind::Actions => Phase::IndexScoping,
            RuleKind::LdapAuthorization | RuleKind::GroupsProviderAuthorization => {
                Phase::Authorization
            }
            RuleKind::IndicesRewrite | RuleKind::Fields => Phase::Mutation,
        }
    }

    /// Position in the global evaluation order. Lower runs first.
    pub fn rank(self) -> u8 {
        match self {
            RuleKind::AuthKey => 0,
            RuleKind::AuthKeySha256 => 1,
            RuleKind::ProxyAuth => 2,
            RuleKind::JwtAuth => 3,
            RuleKind::LdapAuthentication => 4,
            RuleKind::ExternalAuthentication => 5,
            RuleKind::Groups => 6,
            RuleKind::Hosts => 7,
            RuleKind::Methods => 8,
            RuleKind::UriRe => 9,
            RuleKind::MaxBodyLength => 10,
            RuleKind::Headers => 11,
            RuleKind::Users => 12,
            RuleKind::Indices => 13,
            RuleKind::Actions => 14,
            RuleKind::LdapAuthorization => 15,
            RuleKind::GroupsProviderAuthorization => 16,
            RuleKind::IndicesRewrite => 17,
            RuleKind::Fields => 18,
        }
    }

    /// Establishes the caller's identity.
    pub fn is_authentication(self) -> bool {
        matches!(
            self.phase(),
            Phase::Authentication | Phase::SlowAuthentication
        )
    }

    /// Needs an identity established by an authentication rule of the same block.
    pub fn is_authorization(self) -> bool {
        matches!(self, RuleKind::Groups) || self.phase() == Phase::Authorization
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
