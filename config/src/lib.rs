//! Load configuration from XDG `config.toml` and project `.env`, then apply
//! to the process environment with priority: **existing env > .env > XDG**.
//!
//! The runtime tuning knobs live in [`Knobs`] and are read from the
//! environment after [`load_and_apply`].

mod env_file;
mod knobs;
mod xdg_toml;

use std::path::Path;
use thiserror::Error;

pub use knobs::Knobs;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads config from XDG `config.toml` and optional project `.env`, then sets
/// environment variables only for keys that are **not** already set.
///
/// Order of precedence when a key is missing in the process environment:
/// 1. Value from project `.env` (current directory, or `override_dir` if given)
/// 2. Value from `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]` table
///
/// * `app_name`: e.g. `"palaver"`, used for the XDG path.
/// * `override_dir`: if `Some`, look for `.env` there instead of the cwd.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg_toml::load_env_map(app_name)?;
    let dotenv_map = env_file::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<String> = xdg_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue; // existing env wins
        }
        let value = dotenv_map.get(&key).or_else(|| xdg_map.get(&key)).cloned();
        if let Some(v) = value {
            std::env::set_var(&key, v);
        }
    }

    Ok(())
}
