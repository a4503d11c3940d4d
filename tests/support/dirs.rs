use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

pub struct TestDirs {
    _temp: TempDir,
    pub config_dir: PathBuf,
    pub acl_path: PathBuf,
    pub acl_dir: PathBuf,
}

impl TestDirs {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let config_dir = temp.path().join("config");
        let acl_dir = config_dir.join("acl.d");
        std::fs::create_dir_all(&acl_dir)?;
        let acl_path = config_dir.join("acl.toml");

        Ok(Self {
            _temp: temp,
            config_dir,
            acl_path,
            acl_dir,
        })
    }

    /// Writes a settings file pointing at this directory's ACL and returns its path.
    pub fn write_settings(&self, extra: &str) -> Result<PathBuf> {
        let path = self.config_dir.join("indexgate.toml");
        let body = format!("acl = \"acl.toml\"\nlog = \"text\"\n{extra}");
        std::fs::write(&path, body)?;
        Ok(path)
    }

    pub fn write_request(&self, name: &str, body: &str) -> Result<PathBuf> {
        let path = self.config_dir.join(name);
        std::fs::write(&path, body)?;
        Ok(path)
    }

    pub fn root(&self) -> &Path {
        &self.config_dir
    }
}
