use std::{fs, io::ErrorKind, path::Path};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_MOUSE_TIMEOUT: u64 = 10;

/// User-tunable settings, kept as `config.json` in the application
/// directory. Unknown fields are preserved-by-ignoring so older binaries
/// keep working against newer files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds without input after which the user counts as away and
    /// tracking pauses.
    pub mouse_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mouse_timeout: DEFAULT_MOUSE_TIMEOUT,
        }
    }
}

/// Loads the config, creating the file with defaults on first run. A broken
/// or unreadable file is not fatal: the defaults apply and the file is left
/// alone for the user to inspect.
pub fn load_or_create(app_dir: &Path) -> Config {
    let path = app_dir.join(CONFIG_FILE);
    match fs::read_to_string(&path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to parse {path:?}, using defaults: {e}");
                Config::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No config file yet, creating {path:?}");
            let config = Config::default();
            if let Err(e) = store(app_dir, &config) {
                warn!("Failed to write default config {e:?}");
            }
            config
        }
        Err(e) => {
            warn!("Failed to read {path:?}, using defaults: {e}");
            Config::default()
        }
    }
}

pub fn store(app_dir: &Path, config: &Config) -> Result<()> {
    let path = app_dir.join(CONFIG_FILE);
    fs::write(&path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{Config, load_or_create, store};

    #[test]
    fn first_run_creates_the_file_with_defaults() {
        let dir = tempdir().unwrap();
        let config = load_or_create(dir.path());
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.json").is_file());
    }

    #[test]
    fn stored_values_round_trip() {
        let dir = tempdir().unwrap();
        store(dir.path(), &Config { mouse_timeout: 45 }).unwrap();
        assert_eq!(load_or_create(dir.path()).mouse_timeout, 45);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{not json").unwrap();
        assert_eq!(load_or_create(dir.path()), Config::default());
    }
}
