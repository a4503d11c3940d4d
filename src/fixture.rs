//! Requests described in TOML, used by the `eval` command and the tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};

use crate::acl::{LoggedUser, RequestSink, RequestView};
use crate::matcher::{CaseSensitivity, IndexSet, Matcher};

const DEFAULT_ACTION: &str = "indices:data/read/search";

/// Fully materialised request: headers, indices and the host's index universe.
#[derive(Debug, Clone)]
pub struct StaticRequest {
    id: String,
    remote_address: Option<IpAddr>,
    method: Method,
    uri: String,
    headers: HeaderMap,
    content_length: usize,
    action: String,
    read: bool,
    involves_indices: bool,
    indices: IndexSet,
    universe: IndexSet,
    sub_requests: Vec<IndexSet>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequest {
    #[serde(default = "default_id")]
    id: String,
    #[serde(default)]
    remote_address: Option<IpAddr>,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default = "default_uri")]
    uri: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    content_length: usize,
    #[serde(default = "default_action")]
    action: String,
    #[serde(default)]
    read: Option<bool>,
    #[serde(default)]
    involves_indices: Option<bool>,
    #[serde(default)]
    indices: Vec<String>,
    #[serde(default)]
    universe: Vec<String>,
    #[serde(default)]
    sub_requests: Vec<Vec<String>>,
}

fn default_id() -> String {
    "fixture".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_uri() -> String {
    "/".to_string()
}

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

impl TryFrom<RawRequest> for StaticRequest {
    type Error = anyhow::Error;

    fn try_from(raw: RawRequest) -> Result<Self> {
        let method = Method::from_bytes(raw.method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid method '{}'", raw.method))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &raw.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name '{name}'"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header '{name}'"))?;
            headers.append(name, value);
        }
        let read = raw.read.unwrap_or_else(|| {
            raw.action.starts_with("indices:data/read") || raw.action.starts_with("indices:admin/get")
        });
        let involves_indices = raw
            .involves_indices
            .unwrap_or_else(|| raw.action.starts_with("indices:"));

        Ok(Self {
            id: raw.id,
            remote_address: raw.remote_address,
            method,
            uri: raw.uri,
            headers,
            content_length: raw.content_length,
            action: raw.action,
            read,
            involves_indices,
            indices: raw.indices.into_iter().collect(),
            universe: raw.universe.into_iter().collect(),
            sub_requests: raw
                .sub_requests
                .into_iter()
                .map(|item| item.into_iter().collect())
                .collect(),
        })
    }
}

impl StaticRequest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read request fixture at {}", path.display()))?;
        Self::parse(&data)
            .with_context(|| format!("failed to parse request fixture at {}", path.display()))
    }

    pub fn parse(data: &str) -> Result<Self> {
        let raw: RawRequest = toml::from_str(data)?;
        raw.try_into()
    }
}

/// Resolves requested names (wildcards included) against a known universe.
pub fn expand_against(requested: &IndexSet, universe: &IndexSet) -> IndexSet {
    let mut expanded = IndexSet::new();
    for name in requested {
        if name.contains('*') {
            let matcher = Matcher::new([name], CaseSensitivity::Sensitive);
            expanded.extend(matcher.filter(universe));
        } else if universe.contains(name) {
            expanded.insert(name.clone());
        }
    }
    expanded
}

impl RequestView for StaticRequest {
    fn id(&self) -> &str {
        &self.id
    }

    fn remote_address(&self) -> Option<IpAddr> {
        self.remote_address
    }

    fn method(&self) -> &Method {
        &self.method
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn content_length(&self) -> usize {
        self.content_length
    }

    fn action(&self) -> &str {
        &self.action
    }

    fn involves_indices(&self) -> bool {
        self.involves_indices
    }

    fn indices(&self) -> IndexSet {
        self.indices.clone()
    }

    fn is_read_request(&self) -> bool {
        self.read
    }

    fn all_indices_and_aliases(&self) -> IndexSet {
        self.universe.clone()
    }

    fn expanded_indices(&self, requested: &IndexSet) -> IndexSet {
        expand_against(requested, &self.universe)
    }

    fn sub_requests(&self) -> Vec<IndexSet> {
        self.sub_requests.clone()
    }
}

/// What the host would have applied to the request after an allow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommittedRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<IndexSet>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_request_indices: BTreeMap<usize, IndexSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logged_user: Option<LoggedUser>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_filter: Option<BTreeSet<String>>,
}

impl RequestSink for CommittedRequest {
    fn set_indices(&mut self, indices: IndexSet) {
        self.indices = Some(indices);
    }

    fn set_sub_request_indices(&mut self, position: usize, indices: IndexSet) {
        self.sub_request_indices.insert(position, indices);
    }

    fn set_logged_user(&mut self, user: LoggedUser) {
        self.logged_user = Some(user);
    }

    fn set_response_header(&mut self, name: &str, value: &str) {
        self.response_headers
            .insert(name.to_string(), value.to_string());
    }

    fn set_field_filter(&mut self, fields: BTreeSet<String>) {
        self.field_filter = Some(fields);
    }
}
