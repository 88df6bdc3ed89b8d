//! Optional config file loading. Search order: ./wepub.toml, then
//! $XDG_CONFIG_HOME/wepub/config.toml (or ~/.config/wepub/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Directory the staging tree and the .epub are written to when -o is not set.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// User-Agent for the single retry after an HTTP 403. Empty string disables the retry.
    pub fallback_user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 3).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]).
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// `dc:language` of generated books (default "en").
    pub language: Option<String>,
    /// Leave the staging directory in place when generation fails (default true).
    pub keep_staging_on_failure: Option<bool>,
}

/// Search order: (1) ./wepub.toml, (2) $XDG_CONFIG_HOME/wepub/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("wepub.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("wepub").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            return load_config_file(path).map(Some);
        }
    }
    Ok(None)
}

/// Read and parse one config file.
pub fn load_config_file(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    let config: Config =
        toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}
