//! Engine configuration.
//!
//! Loaded from `.anacore.toml`; every field has a default, so an empty file
//! (or no file at all) is valid.
//!
//! ```toml
//! capture_backtraces = true
//! default_fail_fast = false
//! pretty_snapshots = false
//! cache_file = "target/analyses.json"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".anacore.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Keep captured backtraces in ledgers (default: true). They are never
    /// persisted either way.
    #[serde(default = "default_capture_backtraces")]
    pub capture_backtraces: bool,

    /// fail_fast used by `Session::analyze` (default: false)
    #[serde(default)]
    pub default_fail_fast: bool,

    /// Pretty-print snapshot files (default: false)
    #[serde(default)]
    pub pretty_snapshots: bool,

    /// Snapshot location used by `Session::persist` / `Session::restore`
    #[serde(default)]
    pub cache_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture_backtraces: default_capture_backtraces(),
            default_fail_fast: false,
            pretty_snapshots: false,
            cache_file: None,
        }
    }
}

fn default_capture_backtraces() -> bool {
    true
}

/// Parse a configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<EngineConfig> {
    toml::from_str::<EngineConfig>(contents).context("Failed to parse engine configuration")
}

/// Load a configuration file. Relative `cache_file` paths are resolved
/// against the file's directory.
pub fn load_config_from(path: &Path) -> Result<EngineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let mut config = parse_config(&contents)
        .with_context(|| format!("Invalid config file {}", path.display()))?;

    if let (Some(file), Some(dir)) = (config.cache_file.as_ref(), path.parent()) {
        if file.is_relative() {
            config.cache_file = Some(dir.join(file));
        }
    }

    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Generate `start` and its ancestors, at most `max_depth` entries.
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Search `start` and up to nine ancestors for `.anacore.toml`.
///
/// Unreadable or invalid files are logged and skipped; with nothing found
/// the defaults are returned.
pub fn discover_config(start: &Path) -> EngineConfig {
    const MAX_TRAVERSAL_DEPTH: usize = 10;

    directory_ancestors(start.to_path_buf(), MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
        .find_map(|path| match load_config_from(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("{:#}. Ignoring.", e);
                None
            }
        })
        .unwrap_or_else(|| {
            log::debug!(
                "No config found after checking {} directories. Using default config.",
                MAX_TRAVERSAL_DEPTH
            );
            EngineConfig::default()
        })
}
