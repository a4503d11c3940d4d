use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Renders ACL documents for integration tests.
#[derive(Debug, Clone, Default)]
pub struct AclBuilder {
    users: Vec<UserSpec>,
    blocks: Vec<BlockSpec>,
}

#[derive(Debug, Clone)]
struct UserSpec {
    username: String,
    auth_key: String,
    groups: Vec<String>,
}

impl AclBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, username: &str, secret: &str, groups: &[&str]) -> Self {
        self.users.push(UserSpec {
            username: username.to_string(),
            auth_key: format!("{username}:{secret}"),
            groups: to_strings(groups),
        });
        self
    }

    pub fn block(mut self, block: BlockSpec) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn render(self) -> String {
        let mut doc = String::new();
        for user in &self.users {
            let _ = writeln!(doc, "[[user]]");
            let _ = writeln!(doc, "username = \"{}\"", toml_escape(&user.username));
            let _ = writeln!(doc, "auth_key = \"{}\"", toml_escape(&user.auth_key));
            let _ = writeln!(doc, "groups = [{}]", format_string_list(&user.groups));
            doc.push('\n');
        }
        for block in &self.blocks {
            let _ = writeln!(doc, "[[block]]");
            let _ = writeln!(doc, "name = \"{}\"", toml_escape(&block.name));
            if let Some(policy) = &block.policy {
                let _ = writeln!(doc, "policy = \"{policy}\"");
            }
            if let Some(verbosity) = &block.verbosity {
                let _ = writeln!(doc, "verbosity = \"{verbosity}\"");
            }
            for (key, values) in &block.lists {
                let _ = writeln!(doc, "{key} = [{}]", format_string_list(values));
            }
            for (key, value) in &block.scalars {
                let _ = writeln!(doc, "{key} = {value}");
            }
            doc.push('\n');
        }
        doc
    }
}

#[derive(Debug, Clone)]
pub struct BlockSpec {
    name: String,
    policy: Option<&'static str>,
    verbosity: Option<&'static str>,
    lists: Vec<(&'static str, Vec<String>)>,
    scalars: Vec<(&'static str, String)>,
}

impl BlockSpec {
    pub fn allow(name: &str) -> Self {
        Self {
            name: name.to_string(),
            policy: None,
            verbosity: None,
            lists: Vec::new(),
            scalars: Vec::new(),
        }
    }

    pub fn forbid(name: &str) -> Self {
        Self {
            policy: Some("forbid"),
            ..Self::allow(name)
        }
    }

    pub fn quiet(mut self) -> Self {
        self.verbosity = Some("error");
        self
    }

    pub fn auth_key(mut self, user: &str, secret: &str) -> Self {
        self.scalars
            .push(("auth_key", format!("\"{}\"", toml_escape(&format!("{user}:{secret}")))));
        self
    }

    pub fn max_body_length(mut self, max: usize) -> Self {
        self.scalars.push(("max_body_length", max.to_string()));
        self
    }

    pub fn list(mut self, key: &'static str, values: &[&str]) -> Self {
        self.lists.push((key, to_strings(values)));
        self
    }

    pub fn groups(self, groups: &[&str]) -> Self {
        self.list("groups", groups)
    }

    pub fn hosts(self, hosts: &[&str]) -> Self {
        self.list("hosts", hosts)
    }

    pub fn indices(self, patterns: &[&str]) -> Self {
        self.list("indices", patterns)
    }

    pub fn actions(self, patterns: &[&str]) -> Self {
        self.list("actions", patterns)
    }

    pub fn indices_rewrite(self, entries: &[&str]) -> Self {
        self.list("indices_rewrite", entries)
    }
}

pub fn basic_auth(user: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{secret}")))
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn format_string_list(values: &[String]) -> String {
    values
        .iter()
        .map(|value| format!("\"{}\"", toml_escape(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn toml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
