use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::Rule;
use crate::acl::collaborators::{Claims, TokenVerifier};
use crate::acl::context::{LoggedUser, RequestContext, Verdict};
use crate::acl::credentials::strip_scheme;
use crate::acl::ordering::RuleKind;
use crate::config::JwtSettings;
use crate::util::timeout_with_context;

/// Bearer token checked by a token verifier, with optional identity and role claims.
pub struct JwtAuthRule {
    settings: JwtSettings,
    verifier: Arc<dyn TokenVerifier>,
    timeout: Duration,
}

impl JwtAuthRule {
    pub fn new(settings: JwtSettings, verifier: Arc<dyn TokenVerifier>, timeout: Duration) -> Self {
        Self {
            settings,
            verifier,
            timeout,
        }
    }

    fn token<'a>(&self, ctx: &RequestContext<'a>) -> Option<&'a str> {
        let raw = ctx
            .request()
            .headers()
            .get(&self.settings.header)?
            .to_str()
            .ok()?
            .trim();
        let token = strip_scheme(raw, "bearer").unwrap_or(raw).trim();
        (!token.is_empty()).then_some(token)
    }
}

#[async_trait]
impl Rule for JwtAuthRule {
    fn kind(&self) -> RuleKind {
        RuleKind::JwtAuth
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let Some(token) = self.token(ctx) else {
            return Ok(Verdict::NoMatch);
        };
        let verified = timeout_with_context(
            self.timeout,
            self.verifier.verify(token),
            format!("verifying token with '{}'", self.settings.verifier),
        )
        .await?;
        let Some(claims) = verified else {
            debug!(verifier = %self.settings.verifier, "token rejected");
            return Ok(Verdict::NoMatch);
        };

        let user = match &self.settings.user_claim {
            Some(path) => match claim_at(&claims, path).and_then(Value::as_str) {
                Some(user) => Some(user.to_string()),
                None => return Ok(Verdict::NoMatch),
            },
            None => None,
        };

        let roles = match &self.settings.roles_claim {
            Some(path) => claim_strings(claim_at(&claims, path)),
            None => BTreeSet::new(),
        };
        if !self.settings.roles.is_empty() && roles.is_disjoint(&self.settings.roles) {
            return Ok(Verdict::NoMatch);
        }

        if let Some(id) = user {
            ctx.set_logged_user(LoggedUser {
                id,
                current_group: None,
                available_groups: roles,
            });
        }
        Ok(Verdict::Match)
    }
}

/// Looks up a dotted path such as `realm_access.roles`.
fn claim_at<'a>(claims: &'a Claims, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = claims.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn claim_strings(value: Option<&Value>) -> BTreeSet<String> {
    match value {
        Some(Value::String(single)) => BTreeSet::from([single.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::rules::testing::{TestRequest, set};
    use http::HeaderName;
    use serde_json::json;

    struct StaticVerifier;

    #[async_trait]
    impl TokenVerifier for StaticVerifier {
        async fn verify(&self, token: &str) -> Result<Option<Claims>> {
            let claims = match token {
                "good" => json!({"sub": "dana", "realm": {"roles": ["reader", "auditor"]}}),
                "no-sub" => json!({"realm": {"roles": "reader"}}),
                _ => return Ok(None),
            };
            Ok(claims.as_object().cloned())
        }
    }

    fn rule(roles: &[&str]) -> JwtAuthRule {
        JwtAuthRule::new(
            JwtSettings {
                verifier: Arc::from("idp"),
                header: HeaderName::from_static("authorization"),
                user_claim: Some("sub".to_string()),
                roles_claim: Some("realm.roles".to_string()),
                roles: set(roles),
            },
            Arc::new(StaticVerifier),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn valid_token_sets_user_and_roles() {
        let request = TestRequest::default().with_header("authorization", "Bearer good");
        let mut ctx = RequestContext::new(&request);
        assert_eq!(rule(&["auditor"]).check(&mut ctx).await.unwrap(), Verdict::Match);
        let user = ctx.logged_user().expect("logged user");
        assert_eq!(user.id, "dana");
        assert_eq!(user.available_groups, set(&["auditor", "reader"]));
    }

    #[tokio::test]
    async fn missing_role_or_user_claim_does_not_match() {
        let request = TestRequest::default().with_header("authorization", "Bearer good");
        let mut ctx = RequestContext::new(&request);
        assert_eq!(rule(&["admin"]).check(&mut ctx).await.unwrap(), Verdict::NoMatch);

        let request = TestRequest::default().with_header("authorization", "Bearer no-sub");
        let mut ctx = RequestContext::new(&request);
        assert_eq!(rule(&[]).check(&mut ctx).await.unwrap(), Verdict::NoMatch);
    }

    #[tokio::test]
    async fn invalid_or_absent_token_does_not_match() {
        let request = TestRequest::default().with_header("authorization", "Bearer forged");
        let mut ctx = RequestContext::new(&request);
        assert_eq!(rule(&[]).check(&mut ctx).await.unwrap(), Verdict::NoMatch);

        let request = TestRequest::default();
        let mut ctx = RequestContext::new(&request);
        assert_eq!(rule(&[]).check(&mut ctx).await.unwrap(), Verdict::NoMatch);
    }

    #[test]
    fn dotted_claim_paths() {
        let claims = json!({"a": {"b": {"c": "deep"}}, "list": ["x", 1, "y"]});
        let claims = claims.as_object().unwrap();
        assert_eq!(claim_at(claims, "a.b.c").and_then(Value::as_str), Some("deep"));
        assert!(claim_at(claims, "a.missing").is_none());
        assert_eq!(claim_strings(claim_at(claims, "list")), set(&["x", "y"]));
    }
}
