use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the document directory.
pub const DIR_ENV_VAR: &str = "TFINSTANCE_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub terraform: TerraformConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the `.tf.json` documents.
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformConfig {
    pub executable_path: Option<String>,
    /// Pass `-auto-approve` to `terraform apply`.
    pub auto_approve: bool,
}

pub fn init_from_path(path: &str) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path, e))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path, e))?;
    Ok(config)
}

/// Load `~/.tfinstance/config.toml` when present, defaults otherwise.
pub fn init_default() -> anyhow::Result<Config> {
    let path = default_base_directory().join("config.toml");
    if path.exists() {
        init_from_path(&path.to_string_lossy())
    } else {
        Ok(Config::default())
    }
}

pub fn default_base_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tfinstance")
}

fn absolute(path: &str) -> anyhow::Result<PathBuf> {
    let path = Path::new(path);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

impl Config {
    /// Document directory. Priority:
    /// 1. Command line argument
    /// 2. `TFINSTANCE_DIR`
    /// 3. Config file
    /// 4. `~/.tfinstance`
    pub fn resolve_store_directory(
        &self,
        cli_dir: Option<&str>,
        env_dir: Option<&str>,
    ) -> anyhow::Result<PathBuf> {
        if let Some(dir) = cli_dir.or(env_dir).or(self.store.directory.as_deref()) {
            return absolute(dir);
        }
        Ok(default_base_directory())
    }
}
