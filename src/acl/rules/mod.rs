mod auth_key;
mod delegated;
mod groups;
mod indices;
mod inspect;
mod jwt;
mod mutate;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

pub use auth_key::{AuthKeyRule, AuthKeySha256Rule, ProxyAuthRule};
pub use delegated::{AuthenticationRule, AuthorizationRule};
pub use groups::{CURRENT_GROUP_HEADER, AVAILABLE_GROUPS_HEADER, GroupsRule};
pub use indices::IndicesRule;
pub use inspect::{
    ActionsRule, HeadersRule, HostsRule, MaxBodyLengthRule, MethodMask, MethodsRule, UriReRule,
    UsersRule,
};
pub use jwt::JwtAuthRule;
pub use mutate::{FieldsRule, IndicesRewriteRule};

use super::auth::{
    DirectoryAuthenticator, DirectoryAuthorizer, ProviderAuthorizer, ServiceAuthenticator,
};
use super::cache::{cached_authenticator, cached_authorizer};
use super::collaborators::Collaborators;
use super::compile::CompileOptions;
use super::context::{LoggedUser, RequestContext, Verdict};
use super::credentials::BasicCredentials;
use super::ordering::RuleKind;
use crate::config::{RuleSettings, UserDefinition};
use crate::matcher::{CaseSensitivity, Matcher};

/// One condition of a block.
#[async_trait]
pub trait Rule: Send + Sync {
    fn kind(&self) -> RuleKind;

    /// Key reported in history and logs.
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// `Err` is treated by the block as a non-match.
    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict>;
}

/// Everything the factory needs besides the rule's own settings.
pub struct RuleEnv<'a> {
    pub block: &'a str,
    pub collaborators: &'a Collaborators,
    pub users: &'a [UserDefinition],
    pub options: &'a CompileOptions,
}

pub fn build_rule(settings: &RuleSettings, env: &RuleEnv<'_>) -> Result<Box<dyn Rule>> {
    let options = env.options;
    let case = options.case_sensitivity;
    let rule: Box<dyn Rule> = match settings {
        RuleSettings::AuthKey { credentials } => Box::new(AuthKeyRule::new(credentials.clone())),
        RuleSettings::AuthKeySha256 { digest } => Box::new(AuthKeySha256Rule::new(digest.clone())),
        RuleSettings::ProxyAuth {
            users,
            user_id_header,
        } => Box::new(ProxyAuthRule::new(
            Matcher::new(users, case),
            user_id_header.clone(),
        )),
        RuleSettings::JwtAuth(jwt) => {
            let verifier = env.collaborators.token_verifier(&jwt.verifier)?;
            Box::new(JwtAuthRule::new(
                jwt.clone(),
                verifier,
                options.collaborator_timeout,
            ))
        }
        RuleSettings::LdapAuthentication {
            directory,
            cache_ttl,
        } => {
            let client = env.collaborators.directory(directory)?;
            let inner = Arc::new(DirectoryAuthenticator::new(
                directory.clone(),
                client,
                options.collaborator_timeout,
            ));
            let authenticator = cached_authenticator(
                cache_name(env, RuleKind::LdapAuthentication),
                inner,
                *cache_ttl,
                options.cache,
            )?;
            Box::new(AuthenticationRule::new(
                RuleKind::LdapAuthentication,
                authenticator,
            ))
        }
        RuleSettings::ExternalAuthentication { service, cache_ttl } => {
            let client = env.collaborators.auth_service(service)?;
            let inner = Arc::new(ServiceAuthenticator::new(
                service.clone(),
                client,
                options.collaborator_timeout,
            ));
            let authenticator = cached_authenticator(
                cache_name(env, RuleKind::ExternalAuthentication),
                inner,
                *cache_ttl,
                options.cache,
            )?;
            Box::new(AuthenticationRule::new(
                RuleKind::ExternalAuthentication,
                authenticator,
            ))
        }
        RuleSettings::Groups { groups } => Box::new(GroupsRule::new(groups.clone(), env.users)),
        RuleSettings::Hosts {
            hosts,
            accept_x_forwarded_for,
        } => Box::new(HostsRule::new(
            hosts.clone(),
            *accept_x_forwarded_for,
            options.collaborator_timeout,
        )),
        RuleSettings::Methods { methods } => {
            Box::new(MethodsRule::new(MethodMask::from_methods(methods)))
        }
        RuleSettings::UriRe { patterns } => Box::new(UriReRule::new(patterns.clone())),
        RuleSettings::MaxBodyLength { max } => Box::new(MaxBodyLengthRule::new(*max)),
        RuleSettings::Headers { required } => Box::new(HeadersRule::new(required)),
        RuleSettings::Users { patterns } => {
            Box::new(UsersRule::new(PatternSet::new(patterns.clone(), case)))
        }
        RuleSettings::Indices { patterns } => Box::new(IndicesRule::new(
            PatternSet::new(patterns.clone(), case),
            options.remote_cluster_aware,
        )),
        RuleSettings::Actions { patterns } => Box::new(ActionsRule::new(Matcher::new(patterns, case))),
        RuleSettings::LdapAuthorization {
            directory,
            groups,
            cache_ttl,
        } => {
            let client = env.collaborators.directory(directory)?;
            let inner = Arc::new(DirectoryAuthorizer::new(
                directory.clone(),
                client,
                options.collaborator_timeout,
            ));
            let authorizer = cached_authorizer(
                cache_name(env, RuleKind::LdapAuthorization),
                inner,
                *cache_ttl,
                options.cache,
            )?;
            Box::new(AuthorizationRule::new(
                RuleKind::LdapAuthorization,
                groups.clone(),
                authorizer,
            ))
        }
        RuleSettings::GroupsProviderAuthorization {
            provider,
            groups,
            cache_ttl,
        } => {
            let client = env.collaborators.groups_provider(provider)?;
            let inner = Arc::new(ProviderAuthorizer::new(
                provider.clone(),
                client,
                options.collaborator_timeout,
            ));
            let authorizer = cached_authorizer(
                cache_name(env, RuleKind::GroupsProviderAuthorization),
                inner,
                *cache_ttl,
                options.cache,
            )?;
            Box::new(AuthorizationRule::new(
                RuleKind::GroupsProviderAuthorization,
                groups.clone(),
                authorizer,
            ))
        }
        RuleSettings::IndicesRewrite {
            targets,
            replacement,
        } => Box::new(IndicesRewriteRule::new(targets.clone(), replacement.clone())),
        RuleSettings::Fields { fields } => Box::new(FieldsRule::new(fields.clone())),
    };
    Ok(rule)
}

pub fn build_rules(settings: &[RuleSettings], env: &RuleEnv<'_>) -> Result<Vec<Box<dyn Rule>>> {
    settings
        .iter()
        .map(|s| build_rule(s, env).with_context(|| format!("rule '{}'", s.kind())))
        .collect()
}

fn cache_name(env: &RuleEnv<'_>, kind: RuleKind) -> Arc<str> {
    Arc::from(format!("{}/{}", env.block, kind))
}

pub const USER_VARIABLE: &str = "@{user}";

/// Patterns that may reference the logged user through `@{user}`.
#[derive(Debug, Clone)]
pub struct PatternSet {
    raw: Vec<String>,
    fixed: Option<Matcher>,
    case: CaseSensitivity,
}

impl PatternSet {
    pub fn new(raw: Vec<String>, case: CaseSensitivity) -> Self {
        let fixed = if raw.iter().any(|p| p.contains(USER_VARIABLE)) {
            None
        } else {
            Some(Matcher::new(&raw, case))
        };
        Self { raw, fixed, case }
    }

    /// Patterns whose variable cannot be resolved are left out.
    pub fn resolve(&self, user: Option<&LoggedUser>) -> Matcher {
        if let Some(fixed) = &self.fixed {
            return fixed.clone();
        }
        let resolved = self
            .raw
            .iter()
            .filter_map(|p| substitute_user(p, user));
        Matcher::new(resolved, self.case)
    }
}

pub fn substitute_user(pattern: &str, user: Option<&LoggedUser>) -> Option<String> {
    if !pattern.contains(USER_VARIABLE) {
        return Some(pattern.to_string());
    }
    user.map(|u| pattern.replace(USER_VARIABLE, &u.id))
}

/// Basic credentials of the request. Malformed headers are a non-match, not a failure.
pub(crate) fn basic_credentials(ctx: &RequestContext<'_>) -> Option<BasicCredentials> {
    match BasicCredentials::from_headers(ctx.request().headers()) {
        Ok(creds) => creds,
        Err(err) => {
            debug!(error = %err, "ignoring malformed basic credentials");
            None
        }
    }
}
