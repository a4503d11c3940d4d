use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use http::HeaderName;

use super::{Rule, basic_credentials};
use crate::acl::context::{LoggedUser, RequestContext, Verdict};
use crate::acl::ordering::RuleKind;
use crate::matcher::Matcher;

/// Basic credentials compared with a configured `user:secret`.
pub struct AuthKeyRule {
    credentials: Arc<str>,
}

impl AuthKeyRule {
    pub fn new(credentials: Arc<str>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl Rule for AuthKeyRule {
    fn kind(&self) -> RuleKind {
        RuleKind::AuthKey
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let Some(creds) = basic_credentials(ctx) else {
            return Ok(Verdict::NoMatch);
        };
        if creds.joined().as_str() != self.credentials.as_ref() {
            return Ok(Verdict::NoMatch);
        }
        ctx.set_logged_user(LoggedUser::new(creds.user()));
        Ok(Verdict::Match)
    }
}

/// Basic credentials compared by SHA-256 digest of `user:secret`.
pub struct AuthKeySha256Rule {
    digest: Arc<str>,
}

impl AuthKeySha256Rule {
    pub fn new(digest: Arc<str>) -> Self {
        Self { digest }
    }
}

#[async_trait]
impl Rule for AuthKeySha256Rule {
    fn kind(&self) -> RuleKind {
        RuleKind::AuthKeySha256
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let Some(creds) = basic_credentials(ctx) else {
            return Ok(Verdict::NoMatch);
        };
        if creds.sha256_hex() != self.digest.as_ref() {
            return Ok(Verdict::NoMatch);
        }
        ctx.set_logged_user(LoggedUser::new(creds.user()));
        Ok(Verdict::Match)
    }
}

/// Identity asserted by a trusted front proxy through a request header.
pub struct ProxyAuthRule {
    users: Matcher,
    header: HeaderName,
}

impl ProxyAuthRule {
    pub fn new(users: Matcher, header: HeaderName) -> Self {
        Self { users, header }
    }
}

#[async_trait]
impl Rule for ProxyAuthRule {
    fn kind(&self) -> RuleKind {
        RuleKind::ProxyAuth
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let user = ctx
            .request()
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        match user {
            Some(user) if self.users.matches(user) => {
                ctx.set_logged_user(LoggedUser::new(user));
                Ok(Verdict::Match)
            }
            _ => Ok(Verdict::NoMatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::credentials::sha256_hex;
    use crate::acl::rules::testing::TestRequest;
    use crate::matcher::CaseSensitivity;

    async fn run(rule: &dyn Rule, request: &TestRequest) -> (Verdict, Option<String>) {
        let mut ctx = RequestContext::new(request);
        let verdict = rule.check(&mut ctx).await.unwrap();
        (verdict, ctx.logged_user().map(|u| u.id.clone()))
    }

    #[tokio::test]
    async fn auth_key_matches_exact_pair() {
        let rule = AuthKeyRule::new(Arc::from("alice:pw"));
        let ok = TestRequest::default().with_basic("alice", "pw");
        assert_eq!(run(&rule, &ok).await, (Verdict::Match, Some("alice".to_string())));

        let wrong = TestRequest::default().with_basic("alice", "nope");
        assert_eq!(run(&rule, &wrong).await, (Verdict::NoMatch, None));
        assert_eq!(run(&rule, &TestRequest::default()).await, (Verdict::NoMatch, None));
    }

    #[tokio::test]
    async fn malformed_credentials_do_not_match() {
        let rule = AuthKeyRule::new(Arc::from("alice:pw"));
        let request = TestRequest::default().with_header("authorization", "Basic %%%");
        assert_eq!(run(&rule, &request).await, (Verdict::NoMatch, None));
    }

    #[tokio::test]
    async fn sha256_compares_digest() {
        let rule = AuthKeySha256Rule::new(Arc::from(sha256_hex(b"bob:secret")));
        let ok = TestRequest::default().with_basic("bob", "secret");
        assert_eq!(run(&rule, &ok).await, (Verdict::Match, Some("bob".to_string())));
        let wrong = TestRequest::default().with_basic("bob", "Secret");
        assert_eq!(run(&rule, &wrong).await.0, Verdict::NoMatch);
    }

    #[tokio::test]
    async fn proxy_auth_reads_trusted_header() {
        let rule = ProxyAuthRule::new(
            Matcher::new(["svc-*"], CaseSensitivity::Sensitive),
            HeaderName::from_static("x-forwarded-user"),
        );
        let ok = TestRequest::default().with_header("X-Forwarded-User", "svc-reporting");
        assert_eq!(
            run(&rule, &ok).await,
            (Verdict::Match, Some("svc-reporting".to_string()))
        );
        let other = TestRequest::default().with_header("x-forwarded-user", "admin");
        assert_eq!(run(&rule, &other).await.0, Verdict::NoMatch);
        assert_eq!(run(&rule, &TestRequest::default()).await.0, Verdict::NoMatch);
    }
}
