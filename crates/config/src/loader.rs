use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::RgbotConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["rgbot.toml", "rgbot.yaml", "rgbot.yml", "rgbot.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<RgbotConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./rgbot.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/rgbot/rgbot.{toml,yaml,yml,json}` (user-global)
///
/// Returns `RgbotConfig::default()` if no config file is found or it fails
/// to load.
pub fn discover_and_load() -> RgbotConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    RgbotConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/rgbot/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "rgbot").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user-global data directory, used for session stores.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "rgbot").map(|d| d.data_dir().to_path_buf())
}

/// Parse an already env-substituted config string. The format is picked from
/// the file extension of `path`, defaulting to TOML.
pub fn parse_config(raw: &str, path: &Path) -> Result<RgbotConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let parse_err = |message: String| Error::Parse {
        path: path.to_path_buf(),
        message,
    };

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "json" => serde_json::from_str(raw).map_err(|e| parse_err(e.to_string())),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}
