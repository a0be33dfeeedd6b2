use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Public share link of the dialogue database. `dl=1` asks the host for the
/// raw file instead of its preview page.
pub const DEFAULT_SOURCE_URL: &str = "https://www.dropbox.com/scl/fi/dljhp6xzshdgvq7vqk3sz/sunsun_final_dialogue_database_proper.db?rlkey=qlf38ydm1b0n0ocsdbpjx0ih8&st=2h1nmfhq&dl=1";

/// The file host answers non-browser clients with an HTML interstitial.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_source_url")]
    pub source_url: String,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// Files at or below this size are treated as error pages or truncated
    /// downloads, never as a database.
    #[serde(default = "default_min_bytes")]
    pub min_bytes: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            cache_path: default_cache_path(),
            min_bytes: default_min_bytes(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            timeout_secs: None,
        }
    }
}

fn default_source_url() -> String {
    DEFAULT_SOURCE_URL.to_string()
}
fn default_cache_path() -> PathBuf {
    std::env::temp_dir().join("sunsun_database.db")
}
fn default_min_bytes() -> u64 {
    1_000_000
}
fn default_max_redirects() -> usize {
    2
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8888".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.source_url.trim().is_empty() {
        anyhow::bail!("db.source_url must not be empty");
    }

    if config.db.min_bytes == 0 {
        anyhow::bail!("db.min_bytes must be > 0");
    }

    if config.db.max_redirects == 0 {
        anyhow::bail!("db.max_redirects must be >= 1");
    }

    if config.db.timeout_secs == Some(0) {
        anyhow::bail!("db.timeout_secs must be > 0 when set");
    }

    Ok(())
}
