//! Configuration loader with tier-based merging.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project-level config directory.
    pub project_dir: Option<PathBuf>,
    /// User-level config directory.
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration directories from the environment and defaults.
    pub fn discover() -> Self {
        let user_dir = std::env::var("TASK_MANAGER_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".task-manager")));

        let project_dir = std::env::var("TASK_MANAGER_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("task-manager")));

        Self {
            project_dir,
            user_dir,
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Reads a tier's YAML file. Missing files are skipped, malformed ones are
/// logged and skipped.
fn read_tier(dir: Option<&Path>) -> Option<(PathBuf, Value)> {
    let file = dir?.join("config.yaml");
    if !file.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(&file) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %file.display(), error = %e, "Failed to read config file");
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => Some((file, value)),
        Err(e) => {
            warn!(path = %file.display(), error = %e, "Ignoring malformed config file");
            None
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Config files that contributed, lowest tier first.
    sources: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers, then apply `TASK_MANAGER_*` overrides.
    /// An explicit file, from the argument or `TASK_MANAGER_CONFIG_PATH`, replaces the tiers.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self> {
        let explicit = explicit.or_else(|| std::env::var("TASK_MANAGER_CONFIG_PATH").ok().map(PathBuf::from));
        let mut loader = match explicit {
            Some(path) => Self::load_file(ConfigPaths::discover(), path)?,
            None => Self::load_with_paths(ConfigPaths::discover())?,
        };
        apply_overrides(&mut loader.config, |key| std::env::var(key).ok());
        Ok(loader)
    }

    /// Load a single config file in place of the tiers.
    pub fn load_file(paths: ConfigPaths, path: PathBuf) -> Result<Self> {
        let config =
            Config::load(&path).with_context(|| format!("loading config from {}", path.display()))?;
        Ok(Self {
            paths,
            config,
            sources: vec![path],
        })
    }

    /// Merge the file tiers under explicit directories. The environment is not consulted.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        let mut tiers: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut sources = Vec::new();

        for dir in [paths.project_dir.as_deref(), paths.user_dir.as_deref()] {
            if let Some((file, value)) = read_tier(dir) {
                debug!(path = %file.display(), "Loaded config tier");
                tiers.push(value);
                sources.push(file);
            }
        }

        let config: Config = serde_json::from_value(deep_merge_all(tiers))?;

        Ok(Self {
            paths,
            config,
            sources,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

/// Apply `TASK_MANAGER_*` overrides read through `var`. Unparseable values are
/// logged and skipped.
fn apply_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = var("TASK_MANAGER_DB_PATH") {
        config.server.db_path = PathBuf::from(db_path);
    }

    if let Some(port) = var("TASK_MANAGER_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!(value = %port, "Ignoring invalid TASK_MANAGER_PORT"),
        }
    }

    if let Some(size) = var("TASK_MANAGER_PAGE_SIZE") {
        match size.parse() {
            Ok(size) => config.pagination.page_size = size,
            Err(_) => warn!(value = %size, "Ignoring invalid TASK_MANAGER_PAGE_SIZE"),
        }
    }
}
