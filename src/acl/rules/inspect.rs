use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use http::Method;
use regex::Regex;
use tracing::debug;

use super::{PatternSet, Rule};
use crate::acl::context::{RequestContext, Verdict};
use crate::acl::ordering::RuleKind;
use crate::config::HostSpec;
use crate::matcher::{CaseSensitivity, Matcher};
use crate::util::{canonical_ip, first_forwarded_for, timeout_with_context};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Origin address (or forwarded origin) inside the configured networks or hosts.
pub struct HostsRule {
    hosts: Vec<HostSpec>,
    accept_x_forwarded_for: bool,
    timeout: Duration,
}

impl HostsRule {
    pub fn new(hosts: Vec<HostSpec>, accept_x_forwarded_for: bool, timeout: Duration) -> Self {
        Self {
            hosts,
            accept_x_forwarded_for,
            timeout,
        }
    }

    fn origin(&self, ctx: &RequestContext<'_>) -> Result<IpAddr> {
        let request = ctx.request();
        if self.accept_x_forwarded_for
            && let Some(forwarded) = request.header(X_FORWARDED_FOR).and_then(first_forwarded_for)
        {
            return Ok(forwarded);
        }
        request
            .remote_address()
            .ok_or_else(|| anyhow!("request has no remote address"))
    }

    async fn resolves_to(&self, name: &str, addr: IpAddr) -> bool {
        let lookup = timeout_with_context(
            self.timeout,
            async {
                let resolved = tokio::net::lookup_host((name, 0)).await?;
                Ok::<_, anyhow::Error>(resolved.collect::<Vec<_>>())
            },
            format!("resolving host '{name}'"),
        )
        .await;
        match lookup {
            Ok(resolved) => resolved.iter().any(|sa| canonical_ip(sa.ip()) == addr),
            Err(err) => {
                debug!(host = name, error = %err, "host name did not resolve");
                false
            }
        }
    }
}

#[async_trait]
impl Rule for HostsRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Hosts
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        if self.hosts.is_empty() {
            return Ok(Verdict::Match);
        }
        let addr = canonical_ip(self.origin(ctx)?);
        for host in &self.hosts {
            let matched = match host {
                HostSpec::Address(net) => net.contains(addr),
                HostSpec::Name(name) => self.resolves_to(name, addr).await,
            };
            if matched {
                return Ok(Verdict::Match);
            }
        }
        Ok(Verdict::NoMatch)
    }
}

#[derive(Debug, Clone)]
pub struct MethodMask {
    mask: u32,
    extras: Arc<[Method]>,
}

impl MethodMask {
    pub fn from_methods(methods: &[Method]) -> Self {
        let mut mask = 0u32;
        let mut extras = Vec::new();
        for method in methods {
            if let Some(bit) = method_bit(method) {
                mask |= bit;
            } else if !extras.iter().any(|m: &Method| m == method) {
                extras.push(method.clone());
            }
        }
        Self {
            mask,
            extras: Arc::from(extras.into_boxed_slice()),
        }
    }

    pub fn allows(&self, method: &Method) -> bool {
        if let Some(bit) = method_bit(method) {
            return (self.mask & bit) != 0;
        }
        self.extras.iter().any(|m| m == method)
    }
}

fn method_bit(method: &Method) -> Option<u32> {
    match method.as_str() {
        "GET" => Some(1 << 0),
        "POST" => Some(1 << 1),
        "PUT" => Some(1 << 2),
        "PATCH" => Some(1 << 3),
        "DELETE" => Some(1 << 4),
        "HEAD" => Some(1 << 5),
        "OPTIONS" => Some(1 << 6),
        _ => None,
    }
}

pub struct MethodsRule {
    methods: MethodMask,
}

impl MethodsRule {
    pub fn new(methods: MethodMask) -> Self {
        Self { methods }
    }
}

#[async_trait]
impl Rule for MethodsRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Methods
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        Ok(Verdict::from_bool(self.methods.allows(ctx.request().method())))
    }
}

pub struct UriReRule {
    patterns: Vec<Regex>,
}

impl UriReRule {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }
}

#[async_trait]
impl Rule for UriReRule {
    fn kind(&self) -> RuleKind {
        RuleKind::UriRe
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let uri = ctx.request().uri();
        Ok(Verdict::from_bool(self.patterns.iter().any(|re| re.is_match(uri))))
    }
}

pub struct MaxBodyLengthRule {
    max: usize,
}

impl MaxBodyLengthRule {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

#[async_trait]
impl Rule for MaxBodyLengthRule {
    fn kind(&self) -> RuleKind {
        RuleKind::MaxBodyLength
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        Ok(Verdict::from_bool(ctx.request().content_length() <= self.max))
    }
}

/// Every required `name:value` glob must be satisfied by some request header.
/// Names compare case-insensitively, values case-sensitively.
pub struct HeadersRule {
    required: Vec<Matcher>,
}

impl HeadersRule {
    pub fn new(required: &[String]) -> Self {
        let required = required
            .iter()
            .map(|r| Matcher::new([r], CaseSensitivity::Sensitive))
            .collect();
        Self { required }
    }
}

#[async_trait]
impl Rule for HeadersRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Headers
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let present: Vec<String> = ctx
            .request()
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| format!("{}:{}", name.as_str(), value))
            })
            .collect();
        let satisfied = self
            .required
            .iter()
            .all(|matcher| present.iter().any(|h| matcher.matches(h)));
        Ok(Verdict::from_bool(satisfied))
    }
}

pub struct ActionsRule {
    actions: Matcher,
}

impl ActionsRule {
    pub fn new(actions: Matcher) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl Rule for ActionsRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Actions
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        Ok(Verdict::from_bool(self.actions.matches(ctx.request().action())))
    }
}

/// Logged user id must match one of the patterns.
pub struct UsersRule {
    users: PatternSet,
}

impl UsersRule {
    pub fn new(users: PatternSet) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Rule for UsersRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Users
    }

    async fn check(&self, ctx: &mut RequestContext<'_>) -> Result<Verdict> {
        let Some(user) = ctx.logged_user() else {
            return Ok(Verdict::NoMatch);
        };
        let matcher = self.users.resolve(Some(user));
        Ok(Verdict::from_bool(matcher.matches(&user.id)))
    }
}
