use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{ConfigError, Result},
    schema::{FileConfig, RelayConfig},
};

const CONFIG_FILENAME: &str = "clirelay.toml";

/// User-global config directory (`~/.config/clirelay/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "clirelay").map(|d| d.config_dir().to_path_buf())
}

/// First `clirelay.toml` found in `./`, then [`config_dir`].
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    config_dir()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .filter(|p| p.exists())
}

/// Read and parse one config file, expanding `${VAR}` references first.
pub fn load_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&substitute_env(&raw)).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the discovered config file. A missing or broken file falls back to
/// an empty layer with a warning.
pub fn discover_and_load() -> FileConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using env and defaults");
        return FileConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_file(&path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, ignoring file");
            FileConfig::default()
        },
    }
}

/// Resolve the full configuration against the process environment.
///
/// An explicit `path` must load; without one the standard locations are
/// searched.
pub fn load(path: Option<&Path>) -> Result<RelayConfig> {
    let file = match path {
        Some(path) => load_file(path)?,
        None => discover_and_load(),
    };
    RelayConfig::from_sources(file, |name| std::env::var(name).ok())
}
