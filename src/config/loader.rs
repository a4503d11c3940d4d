use std::collections::{BTreeSet, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use http::{HeaderName, Method};
use regex::Regex;
use serde::Deserialize;

use super::{
    ValidatedConfig,
    model::{
        AclConfig, BlockConfig, BlockPolicy, HostSpec, JwtSettings, LocalCredential, RuleSettings,
        UserDefinition, Verbosity,
    },
};
use crate::util::parse_ip_or_cidr;

const DEFAULT_PROXY_USER_HEADER: &str = "x-forwarded-user";
const DEFAULT_JWT_HEADER: &str = "authorization";
const MAX_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ValidatedConfig> {
    load_config_with_dir(path, None)
}

/// Loads the main ACL document plus every `*.toml` file of `dir`, appended in
/// file-name order.
pub fn load_config_with_dir<P: AsRef<Path>>(path: P, dir: Option<&Path>) -> Result<ValidatedConfig> {
    let mut doc = parse_acl_file(path.as_ref())?;
    if let Some(dir) = dir {
        for file in collect_toml_files(dir)? {
            let extra = parse_acl_file(&file)?;
            doc.users.extend(extra.users);
            doc.blocks.extend(extra.blocks);
        }
    }
    build_config(doc)
}

/// Parses a single ACL document held in memory.
pub fn parse_config_str(data: &str) -> Result<ValidatedConfig> {
    let doc: AclDoc = toml::from_str(data).context("failed to parse access control list")?;
    build_config(doc)
}

fn build_config(doc: AclDoc) -> Result<ValidatedConfig> {
    let users = doc
        .users
        .into_iter()
        .map(build_user)
        .collect::<Result<Vec<_>>>()?;
    let blocks = doc
        .blocks
        .into_iter()
        .map(build_block)
        .collect::<Result<Vec<_>>>()?;
    ValidatedConfig::new(AclConfig { blocks, users })
}

fn parse_acl_file(path: &Path) -> Result<AclDoc> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read access control list at {}", path.display()))?;
    toml::from_str(&data)
        .with_context(|| format!("failed to parse access control list at {}", path.display()))
}

fn build_user(raw: RawUser) -> Result<UserDefinition> {
    let RawUser {
        username,
        auth_key,
        auth_key_sha256,
        groups,
    } = raw;
    ensure!(!username.trim().is_empty(), "user definition must have a username");
    let credential = match (auth_key, auth_key_sha256) {
        (Some(key), None) => LocalCredential::AuthKey(
            parse_auth_key(&key).with_context(|| format!("user '{}'", username))?,
        ),
        (None, Some(digest)) => LocalCredential::AuthKeySha256(
            parse_sha256_digest(&digest).with_context(|| format!("user '{}'", username))?,
        ),
        (None, None) => bail!("user '{}' must specify auth_key or auth_key_sha256", username),
        (Some(_), Some(_)) => bail!(
            "user '{}' must not specify both auth_key and auth_key_sha256",
            username
        ),
    };
    let groups = non_empty_set(groups).with_context(|| format!("user '{}' groups", username))?;
    Ok(UserDefinition {
        username: Arc::from(username),
        credential,
        groups,
    })
}

fn build_block(raw: RawBlock) -> Result<BlockConfig> {
    let name = raw.name.clone();
    ensure!(!name.trim().is_empty(), "block name must not be empty");
    let (policy, verbosity) = (raw.policy, raw.verbosity);
    let rules = build_rules(raw).with_context(|| format!("block '{}'", name))?;
    Ok(BlockConfig {
        name: Arc::from(name),
        policy,
        verbosity,
        rules,
    })
}

fn build_rules(raw: RawBlock) -> Result<Vec<RuleSettings>> {
    let RawBlock {
        name: _,
        policy: _,
        verbosity: _,
        auth_key,
        auth_key_sha256,
        proxy_auth,
        jwt_auth,
        ldap_authentication,
        external_authentication,
        groups,
        hosts,
        accept_x_forwarded_for,
        methods,
        uri_re,
        max_body_length,
        headers,
        users,
        indices,
        actions,
        ldap_authorization,
        groups_provider_authorization,
        indices_rewrite,
        fields,
    } = raw;

    let mut rules = Vec::new();
    if let Some(key) = auth_key {
        rules.push(RuleSettings::AuthKey {
            credentials: parse_auth_key(&key).context("auth_key")?,
        });
    }
    if let Some(digest) = auth_key_sha256 {
        rules.push(RuleSettings::AuthKeySha256 {
            digest: parse_sha256_digest(&digest).context("auth_key_sha256")?,
        });
    }
    if let Some(proxy) = proxy_auth {
        let header = proxy
            .user_id_header
            .as_deref()
            .unwrap_or(DEFAULT_PROXY_USER_HEADER);
        rules.push(RuleSettings::ProxyAuth {
            users: non_empty_patterns(proxy.users).context("proxy_auth users")?,
            user_id_header: parse_header_name(header).context("proxy_auth user_id_header")?,
        });
    }
    if let Some(jwt) = jwt_auth {
        ensure!(!jwt.verifier.trim().is_empty(), "jwt_auth verifier must not be empty");
        let header = jwt.header_name.as_deref().unwrap_or(DEFAULT_JWT_HEADER);
        rules.push(RuleSettings::JwtAuth(JwtSettings {
            verifier: Arc::from(jwt.verifier),
            header: parse_header_name(header).context("jwt_auth header_name")?,
            user_claim: jwt.user_claim,
            roles_claim: jwt.roles_claim,
            roles: jwt.roles.into_iter().collect(),
        }));
    }
    if let Some(ldap) = ldap_authentication {
        rules.push(RuleSettings::LdapAuthentication {
            directory: collaborator_name(ldap.directory, "ldap_authentication directory")?,
            cache_ttl: cache_ttl(ldap.cache_ttl_secs).context("ldap_authentication")?,
        });
    }
    if let Some(external) = external_authentication {
        rules.push(RuleSettings::ExternalAuthentication {
            service: collaborator_name(external.service, "external_authentication service")?,
            cache_ttl: cache_ttl(external.cache_ttl_secs).context("external_authentication")?,
        });
    }
    if let Some(groups) = groups {
        rules.push(RuleSettings::Groups {
            groups: non_empty_set(groups).context("groups")?,
        });
    }
    match (hosts, accept_x_forwarded_for) {
        (Some(hosts), forwarded) => rules.push(RuleSettings::Hosts {
            hosts: hosts
                .iter()
                .map(|h| parse_host(h))
                .collect::<Result<Vec<_>>>()
                .context("hosts")?,
            accept_x_forwarded_for: forwarded.unwrap_or(false),
        }),
        (None, Some(_)) => bail!("accept_x_forwarded_for requires a hosts rule"),
        (None, None) => {}
    }
    if let Some(methods) = methods {
        rules.push(RuleSettings::Methods {
            methods: parse_methods(&methods)?,
        });
    }
    if let Some(patterns) = uri_re {
        ensure!(!patterns.is_empty(), "uri_re must not be empty");
        rules.push(RuleSettings::UriRe {
            patterns: compile_regexes(&patterns).context("uri_re")?,
        });
    }
    if let Some(max) = max_body_length {
        rules.push(RuleSettings::MaxBodyLength { max });
    }
    if let Some(headers) = headers {
        rules.push(RuleSettings::Headers {
            required: parse_required_headers(headers)?,
        });
    }
    if let Some(users) = users {
        rules.push(RuleSettings::Users {
            patterns: non_empty_patterns(users).context("users")?,
        });
    }
    if let Some(indices) = indices {
        rules.push(RuleSettings::Indices {
            patterns: non_empty_patterns(indices).context("indices")?,
        });
    }
    if let Some(actions) = actions {
        rules.push(RuleSettings::Actions {
            patterns: non_empty_patterns(actions).context("actions")?,
        });
    }
    if let Some(ldap) = ldap_authorization {
        rules.push(RuleSettings::LdapAuthorization {
            directory: collaborator_name(ldap.directory, "ldap_authorization directory")?,
            groups: non_empty_set(ldap.groups).context("ldap_authorization groups")?,
            cache_ttl: cache_ttl(ldap.cache_ttl_secs).context("ldap_authorization")?,
        });
    }
    if let Some(provider) = groups_provider_authorization {
        rules.push(RuleSettings::GroupsProviderAuthorization {
            provider: collaborator_name(provider.provider, "groups_provider_authorization provider")?,
            groups: non_empty_set(provider.groups).context("groups_provider_authorization groups")?,
            cache_ttl: cache_ttl(provider.cache_ttl_secs).context("groups_provider_authorization")?,
        });
    }
    if let Some(mut rewrite) = indices_rewrite {
        ensure!(
            rewrite.len() >= 2,
            "indices_rewrite needs at least one target regex and a replacement"
        );
        let replacement = rewrite.pop().unwrap_or_default();
        rules.push(RuleSettings::IndicesRewrite {
            targets: compile_regexes(&rewrite).context("indices_rewrite")?,
            replacement,
        });
    }
    if let Some(fields) = fields {
        rules.push(RuleSettings::Fields {
            fields: parse_fields(fields)?,
        });
    }

    Ok(rules)
}

fn parse_auth_key(value: &str) -> Result<Arc<str>> {
    let Some((user, _)) = value.split_once(':') else {
        bail!("auth_key must have the form 'user:secret'");
    };
    ensure!(!user.is_empty(), "auth_key user must not be empty");
    Ok(Arc::from(value))
}

fn parse_sha256_digest(value: &str) -> Result<Arc<str>> {
    let digest = value.trim().to_ascii_lowercase();
    ensure!(
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()),
        "auth_key_sha256 must be 64 hexadecimal characters"
    );
    Ok(Arc::from(digest))
}

fn parse_header_name(value: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(value.trim().to_ascii_lowercase().as_bytes())
        .with_context(|| format!("invalid header name '{}'", value))
}

fn cache_ttl(secs: u64) -> Result<Duration> {
    ensure!(
        secs <= MAX_CACHE_TTL_SECS,
        "cache_ttl_secs must be at most {} (got {})",
        MAX_CACHE_TTL_SECS,
        secs
    );
    Ok(Duration::from_secs(secs))
}

fn collaborator_name(name: String, what: &str) -> Result<Arc<str>> {
    ensure!(!name.trim().is_empty(), "{} must not be empty", what);
    Ok(Arc::from(name))
}

fn non_empty_patterns(values: Vec<String>) -> Result<Vec<String>> {
    ensure!(!values.is_empty(), "list must not be empty");
    for value in &values {
        ensure!(!value.is_empty(), "list entries must not be empty");
    }
    Ok(values)
}

fn non_empty_set(values: Vec<String>) -> Result<BTreeSet<String>> {
    Ok(non_empty_patterns(values)?.into_iter().collect())
}

fn parse_host(value: &str) -> Result<HostSpec> {
    let trimmed = value.trim();
    ensure!(!trimmed.is_empty(), "host entries must not be empty");
    if trimmed.contains('/') || trimmed.parse::<std::net::IpAddr>().is_ok() {
        return Ok(HostSpec::Address(parse_ip_or_cidr(trimmed)?));
    }
    ensure!(
        !trimmed.chars().any(char::is_whitespace),
        "invalid host name '{}'",
        trimmed
    );
    Ok(HostSpec::Name(Arc::from(trimmed.to_ascii_lowercase())))
}

fn parse_methods(methods: &[String]) -> Result<Vec<Method>> {
    ensure!(!methods.is_empty(), "methods array must not be empty");
    let mut seen = HashSet::new();
    let mut parsed = Vec::with_capacity(methods.len());
    for method in methods {
        let normalized = method.to_ascii_uppercase();
        let parsed_method: Method = normalized
            .parse()
            .with_context(|| format!("invalid HTTP method '{}'", method))?;
        if !seen.insert(parsed_method.clone()) {
            bail!("duplicate HTTP method '{}'", method);
        }
        parsed.push(parsed_method);
    }
    Ok(parsed)
}

fn compile_regexes(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("invalid regular expression '{}'", p)))
        .collect()
}

/// Header names are case-insensitive and stored lowercased; values keep their case.
fn parse_required_headers(headers: Vec<String>) -> Result<Vec<String>> {
    ensure!(!headers.is_empty(), "headers must not be empty");
    let mut seen = HashSet::new();
    let mut required = Vec::with_capacity(headers.len());
    for header in headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("header '{}' must have the form 'name:value'", header);
        };
        let name = name.trim().to_ascii_lowercase();
        ensure!(!name.is_empty(), "header '{}' has an empty name", header);
        ensure!(!value.is_empty(), "header '{}' has an empty value", header);
        if !seen.insert(name.clone()) {
            bail!("duplicate header '{}'", name);
        }
        required.push(format!("{name}:{value}"));
    }
    Ok(required)
}

/// Either all entries allow fields or all (`~`-prefixed) deny them.
fn parse_fields(fields: Vec<String>) -> Result<BTreeSet<String>> {
    ensure!(!fields.is_empty(), "fields must not be empty");
    let denied = fields.iter().filter(|f| f.starts_with('~')).count();
    ensure!(
        denied == 0 || denied == fields.len(),
        "fields must not mix allowed and '~' denied entries"
    );
    for field in &fields {
        ensure!(
            !field.trim_start_matches('~').is_empty(),
            "fields entries must not be empty"
        );
    }
    Ok(fields.into_iter().collect())
}

fn collect_toml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    if !dir.is_dir() {
        bail!("access control directory {} is not a directory", dir.display());
    }

    let mut files = Vec::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read access control directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in directory {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if file_type.is_file() && is_toml_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_toml_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AclDoc {
    #[serde(default, rename = "user")]
    users: Vec<RawUser>,
    #[serde(default, rename = "block")]
    blocks: Vec<RawBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUser {
    username: String,
    #[serde(default)]
    auth_key: Option<String>,
    #[serde(default)]
    auth_key_sha256: Option<String>,
    #[serde(default)]
    groups: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBlock {
    name: String,
    #[serde(default)]
    policy: BlockPolicy,
    #[serde(default)]
    verbosity: Verbosity,
    #[serde(default)]
    auth_key: Option<String>,
    #[serde(default)]
    auth_key_sha256: Option<String>,
    #[serde(default)]
    proxy_auth: Option<RawProxyAuth>,
    #[serde(default)]
    jwt_auth: Option<RawJwtAuth>,
    #[serde(default)]
    ldap_authentication: Option<RawDirectoryAuthentication>,
    #[serde(default)]
    external_authentication: Option<RawServiceAuthentication>,
    #[serde(default)]
    groups: Option<Vec<String>>,
    #[serde(default)]
    hosts: Option<Vec<String>>,
    #[serde(default)]
    accept_x_forwarded_for: Option<bool>,
    #[serde(default)]
    methods: Option<Vec<String>>,
    #[serde(default)]
    uri_re: Option<Vec<String>>,
    #[serde(default)]
    max_body_length: Option<usize>,
    #[serde(default)]
    headers: Option<Vec<String>>,
    #[serde(default)]
    users: Option<Vec<String>>,
    #[serde(default)]
    indices: Option<Vec<String>>,
    #[serde(default)]
    actions: Option<Vec<String>>,
    #[serde(default)]
    ldap_authorization: Option<RawDirectoryAuthorization>,
    #[serde(default)]
    groups_provider_authorization: Option<RawProviderAuthorization>,
    #[serde(default)]
    indices_rewrite: Option<Vec<String>>,
    #[serde(default)]
    fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProxyAuth {
    users: Vec<String>,
    #[serde(default)]
    user_id_header: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJwtAuth {
    verifier: String,
    #[serde(default)]
    header_name: Option<String>,
    #[serde(default)]
    user_claim: Option<String>,
    #[serde(default)]
    roles_claim: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDirectoryAuthentication {
    directory: String,
    #[serde(default)]
    cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServiceAuthentication {
    service: String,
    #[serde(default)]
    cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDirectoryAuthorization {
    directory: String,
    groups: Vec<String>,
    #[serde(default)]
    cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProviderAuthorization {
    provider: String,
    groups: Vec<String>,
    #[serde(default)]
    cache_ttl_secs: u64,
}
