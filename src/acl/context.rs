use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::matcher::IndexSet;

use super::request::{RequestSink, RequestView};

/// Identity established by an authentication rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_group: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub available_groups: BTreeSet<String>,
}

impl LoggedUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            current_group: None,
            available_groups: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    NoMatch,
}

impl Verdict {
    pub fn from_bool(matched: bool) -> Self {
        if matched { Verdict::Match } else { Verdict::NoMatch }
    }

    pub fn is_match(self) -> bool {
        matches!(self, Verdict::Match)
    }
}

/// One entry of a block's evaluation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleExitResult {
    pub rule: Arc<str>,
    pub matched: bool,
}

impl fmt::Display for RuleExitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.rule, self.matched)
    }
}

/// Changes requested by rules. Buffered per block evaluation and handed to
/// the host only when the matched block allows the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Mutations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<IndexSet>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_request_indices: BTreeMap<usize, IndexSet>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_filter: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logged_user: Option<LoggedUser>,
}

impl Mutations {
    pub fn apply(self, sink: &mut dyn RequestSink) {
        if let Some(user) = self.logged_user {
            sink.set_logged_user(user);
        }
        if let Some(indices) = self.indices {
            sink.set_indices(indices);
        }
        for (position, indices) in self.sub_request_indices {
            sink.set_sub_request_indices(position, indices);
        }
        for (name, value) in &self.response_headers {
            sink.set_response_header(name, value);
        }
        if let Some(fields) = self.field_filter {
            sink.set_field_filter(fields);
        }
    }
}

/// Per-block evaluation state. A fresh context is created for every block so
/// nothing written by a failed block leaks into the next one.
pub struct RequestContext<'r> {
    request: &'r dyn RequestView,
    mutations: Mutations,
}

impl<'r> RequestContext<'r> {
    pub fn new(request: &'r dyn RequestView) -> Self {
        Self {
            request,
            mutations: Mutations::default(),
        }
    }

    pub fn request(&self) -> &'r dyn RequestView {
        self.request
    }

    pub fn logged_user(&self) -> Option<&LoggedUser> {
        self.mutations.logged_user.as_ref()
    }

    pub fn set_logged_user(&mut self, user: LoggedUser) {
        self.mutations.logged_user = Some(user);
    }

    /// Indices as seen by later rules: the last rewrite if any, else the request's own.
    pub fn indices(&self) -> IndexSet {
        match &self.mutations.indices {
            Some(indices) => indices.clone(),
            None => self.request.indices(),
        }
    }

    pub fn set_indices(&mut self, indices: IndexSet) {
        self.mutations.indices = Some(indices);
    }

    pub fn sub_request_indices(&self) -> Vec<IndexSet> {
        self.request
            .sub_requests()
            .into_iter()
            .enumerate()
            .map(|(position, original)| {
                self.mutations
                    .sub_request_indices
                    .get(&position)
                    .cloned()
                    .unwrap_or(original)
            })
            .collect()
    }

    pub fn set_sub_request_indices(&mut self, position: usize, indices: IndexSet) {
        self.mutations.sub_request_indices.insert(position, indices);
    }

    pub fn set_response_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.mutations
            .response_headers
            .insert(name.into(), value.into());
    }

    pub fn set_field_filter(&mut self, fields: BTreeSet<String>) {
        self.mutations.field_filter = Some(fields);
    }

    pub fn mutations(&self) -> &Mutations {
        &self.mutations
    }

    pub fn into_mutations(self) -> Mutations {
        self.mutations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_exit_results_serialize_for_reports() {
        let entry = RuleExitResult {
            rule: Arc::from("indices"),
            matched: true,
        };
        assert_eq!(entry.to_string(), "indices->true");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"rule": "indices", "matched": true}));
    }
}
