use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail, ensure};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::acl::CompileOptions;
use crate::acl::cache::CacheOptions;
use crate::cli::{Cli, LogFormat};
use crate::config as acl_config;
use crate::matcher::CaseSensitivity;

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_remote_cluster_aware() -> bool {
    true
}

fn default_collaborator_timeout() -> u64 {
    10
}

fn default_auth_cache_capacity() -> usize {
    10_000
}

fn default_auth_cache_shards() -> usize {
    16
}

fn default_prompt_for_basic_auth() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub acl: PathBuf,
    #[serde(default)]
    pub acl_dir: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub log: LogFormat,
    #[serde(default)]
    pub case_sensitivity: CaseSensitivity,
    #[serde(default = "default_remote_cluster_aware")]
    pub remote_cluster_aware: bool,
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout: u64,
    #[serde(default = "default_auth_cache_capacity")]
    pub auth_cache_capacity: usize,
    #[serde(default = "default_auth_cache_shards")]
    pub auth_cache_shards: usize,
    #[serde(default = "default_prompt_for_basic_auth")]
    pub prompt_for_basic_auth: bool,
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = Config::builder();
        let config_path = resolve_config_path(cli)?;

        builder = builder.add_source(File::from(config_path.clone()).required(true));

        builder = builder.add_source(
            Environment::with_prefix("INDEXGATE")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().map_err(to_anyhow)?;
        let mut settings: Settings = cfg.try_deserialize().map_err(to_anyhow)?;
        settings.apply_base_dir(&config_path);
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings and the access control list they point at, failing fast
    /// on either.
    pub fn load_with_config(cli: &Cli) -> Result<(Self, acl_config::ValidatedConfig)> {
        let settings = Self::load(cli)?;
        let acl = settings.load_acl_config()?;
        Ok((settings, acl))
    }

    pub fn load_acl_config(&self) -> Result<acl_config::ValidatedConfig> {
        acl_config::load_config_with_dir(&self.acl, self.acl_dir.as_deref())
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout)
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            case_sensitivity: self.case_sensitivity,
            remote_cluster_aware: self.remote_cluster_aware,
            collaborator_timeout: self.collaborator_timeout(),
            cache: CacheOptions {
                capacity: self.auth_cache_capacity,
                shards: self.auth_cache_shards,
            },
            prompt_for_basic_auth: self.prompt_for_basic_auth,
        }
    }
}

fn to_anyhow(err: ConfigError) -> anyhow::Error {
    anyhow::anyhow!(err)
}

impl Cli {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

fn resolve_config_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = cli.config_path() {
        return Ok(path.to_path_buf());
    }

    for candidate in default_config_candidates() {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    bail!(
        "no configuration file provided via --config and none found in default locations: {}",
        default_config_candidates()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
}

fn default_config_candidates() -> [PathBuf; 2] {
    [
        PathBuf::from("/etc/indexgate/indexgate.toml"),
        PathBuf::from("indexgate.toml"),
    ]
}

impl Settings {
    fn apply_base_dir(&mut self, config_path: &Path) {
        let base_dir = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        self.acl = absolutize(&self.acl, base_dir);
        self.acl_dir = self.acl_dir.as_ref().map(|path| absolutize(path, base_dir));
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.collaborator_timeout > 0,
            "collaborator_timeout must be greater than 0 seconds (got {})",
            self.collaborator_timeout
        );
        ensure!(
            self.auth_cache_capacity > 0,
            "auth_cache_capacity must be greater than 0 (got {})",
            self.auth_cache_capacity
        );
        ensure!(
            self.auth_cache_shards > 0,
            "auth_cache_shards must be greater than 0 (got {})",
            self.auth_cache_shards
        );
        ensure!(
            self.auth_cache_shards <= self.auth_cache_capacity,
            "auth_cache_shards ({}) must not exceed auth_cache_capacity ({})",
            self.auth_cache_shards,
            self.auth_cache_capacity
        );
        Ok(())
    }
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
