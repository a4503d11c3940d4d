#![allow(dead_code)]

mod acl;
mod dirs;
mod logging;

pub use acl::{AclBuilder, BlockSpec, basic_auth};
pub use dirs::TestDirs;
pub use logging::LogCapture;

use anyhow::Result;

use indexgate::cli::LogFormat;
use indexgate::matcher::CaseSensitivity;
use indexgate::settings::Settings;

pub fn default_test_settings(dirs: &TestDirs) -> Settings {
    Settings {
        acl: dirs.acl_path.clone(),
        acl_dir: None,
        log: LogFormat::Text,
        case_sensitivity: CaseSensitivity::Sensitive,
        remote_cluster_aware: true,
        collaborator_timeout: 5,
        auth_cache_capacity: 1_000,
        auth_cache_shards: 4,
        prompt_for_basic_auth: true,
    }
}

pub fn write_acl(dirs: &TestDirs, acl: &str) -> Result<()> {
    std::fs::write(&dirs.acl_path, acl)?;
    Ok(())
}
