mod loader;
pub mod model;

use std::collections::HashSet;
use std::ops::Deref;

use anyhow::{Result, bail, ensure};

pub use loader::{load_config, load_config_with_dir, parse_config_str};
pub use model::{
    AclConfig, BlockConfig, BlockPolicy, HostSpec, JwtSettings, LocalCredential, RuleSettings,
    UserDefinition, Verbosity,
};

/// Structural checks shared by the file loader and programmatic configs so
/// that reloads and embedded use get identical guarantees.
pub fn validate_blocks(config: &AclConfig) -> Result<()> {
    ensure!(
        !config.blocks.is_empty(),
        "access control list must define at least one block"
    );

    let mut usernames = HashSet::new();
    for user in &config.users {
        if !usernames.insert(user.username.as_ref()) {
            bail!("duplicate user definition '{}'", user.username);
        }
    }

    let mut names = HashSet::new();
    for block in &config.blocks {
        if !names.insert(block.name.as_ref()) {
            bail!("duplicate block name '{}'", block.name);
        }
        ensure!(
            !block.rules.is_empty(),
            "block '{}' must contain at least one rule",
            block.name
        );

        let mut kinds = HashSet::new();
        for rule in &block.rules {
            if !kinds.insert(rule.kind()) {
                bail!("block '{}' defines rule '{}' more than once", block.name, rule.kind());
            }
        }

        let authenticates = block.rules.iter().any(|r| r.kind().is_authentication());
        if let Some(authz) = block.rules.iter().find(|r| r.kind().is_authorization())
            && !authenticates
        {
            bail!(
                "block '{}' has authorization rule '{}' but no authentication rule",
                block.name,
                authz.kind()
            );
        }

        for rule in &block.rules {
            if let RuleSettings::Groups { groups } = rule
                && !config.users.iter().any(|u| !u.groups.is_disjoint(groups))
            {
                bail!(
                    "block '{}' groups rule does not match any defined user",
                    block.name
                );
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    inner: AclConfig,
}

impl ValidatedConfig {
    pub fn new(config: AclConfig) -> Result<Self> {
        validate_blocks(&config)?;
        Ok(Self { inner: config })
    }

    pub fn into_inner(self) -> AclConfig {
        self.inner
    }
}

impl AsRef<AclConfig> for ValidatedConfig {
    fn as_ref(&self) -> &AclConfig {
        &self.inner
    }
}

impl Deref for ValidatedConfig {
    type Target = AclConfig;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
