//! Relay configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional
//! `clirelay.toml` (searched in `./` then the user config dir, with
//! `${ENV_VAR}` substitution), then process environment variables.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{ConfigError, Result},
    loader::{config_dir, discover_and_load, find_config_file, load, load_file},
    schema::{FileConfig, RelayConfig},
};
