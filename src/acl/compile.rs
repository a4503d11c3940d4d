use std::time::Duration;

use anyhow::{Context, Result};

use super::Acl;
use super::block::Block;
use super::cache::CacheOptions;
use super::collaborators::Collaborators;
use super::rules::{RuleEnv, build_rules};
use crate::config::ValidatedConfig;
use crate::matcher::CaseSensitivity;

/// Engine-wide knobs that apply to every compiled block.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub case_sensitivity: CaseSensitivity,
    pub remote_cluster_aware: bool,
    pub collaborator_timeout: Duration,
    pub cache: CacheOptions,
    pub prompt_for_basic_auth: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            case_sensitivity: CaseSensitivity::default(),
            remote_cluster_aware: true,
            collaborator_timeout: Duration::from_secs(10),
            cache: CacheOptions::default(),
            prompt_for_basic_auth: true,
        }
    }
}

/// Turns a validated configuration into a runnable [`Acl`].
///
/// Collaborator names are resolved here, so a block that references an
/// unregistered directory or service fails the whole compilation and the
/// previous ACL stays active.
pub fn compile_config(
    config: &ValidatedConfig,
    collaborators: &Collaborators,
    options: &CompileOptions,
) -> Result<Acl> {
    let config = config.as_ref();
    let mut blocks = Vec::with_capacity(config.blocks.len());
    for block in &config.blocks {
        let env = RuleEnv {
            block: &block.name,
            collaborators,
            users: &config.users,
            options,
        };
        let rules =
            build_rules(&block.rules, &env).with_context(|| format!("block '{}'", block.name))?;
        blocks.push(Block::new(
            block.name.clone(),
            block.policy,
            block.verbosity,
            rules,
        )?);
    }
    Ok(Acl::new(blocks, options.prompt_for_basic_auth))
}
