//! Configuration file discovery and loading

use std::path::{Path, PathBuf};

use super::Config;

/// Configuration file wrapper with path information
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Path where the configuration was loaded from (empty for defaults)
    pub path: PathBuf,

    /// The parsed configuration
    pub config: Config,
}

/// Configuration file search path with description
#[derive(Debug, Clone)]
pub struct ConfigPath {
    /// The actual file path
    pub path: PathBuf,
    /// Human-readable description for display
    pub description: &'static str,
}

/// Standard configuration file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Application name for directory paths
const APP_NAME: &str = "bpq-auth-proxy";

/// Get all configuration search paths with descriptions (in priority order)
///
/// Search order:
/// 1. `./config.toml` (working directory, next to `users.csv`)
/// 2. `$XDG_CONFIG_HOME/bpq-auth-proxy/config.toml` (if env var set)
/// 3. `~/.config/bpq-auth-proxy/config.toml`
/// 4. `~/.bpq-auth-proxy.toml`
/// 5. `/etc/bpq-auth-proxy/config.toml` (Unix system-wide)
pub fn config_search_paths() -> Vec<ConfigPath> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(ConfigPath {
            path: cwd.join(CONFIG_FILE_NAME),
            description: "./config.toml",
        });
    }

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(ConfigPath {
            path: PathBuf::from(xdg).join(APP_NAME).join(CONFIG_FILE_NAME),
            description: "$XDG_CONFIG_HOME/bpq-auth-proxy/config.toml",
        });
    }

    if let Some(home) = dirs::home_dir() {
        let dotconfig = home.join(".config").join(APP_NAME).join(CONFIG_FILE_NAME);
        if !paths.iter().any(|p| p.path == dotconfig) {
            paths.push(ConfigPath {
                path: dotconfig,
                description: "~/.config/bpq-auth-proxy/config.toml",
            });
        }
        paths.push(ConfigPath {
            path: home.join(format!(".{}.toml", APP_NAME)),
            description: "~/.bpq-auth-proxy.toml",
        });
    }

    #[cfg(unix)]
    {
        paths.push(ConfigPath {
            path: PathBuf::from("/etc").join(APP_NAME).join(CONFIG_FILE_NAME),
            description: "/etc/bpq-auth-proxy/config.toml",
        });
    }

    paths
}

/// Find the configuration file in standard locations
///
/// Returns `None` if no configuration file is found.
pub fn find_config_file() -> Option<PathBuf> {
    for cp in config_search_paths() {
        if cp.path.is_file() {
            tracing::info!(path = %cp.path.display(), "Found configuration file");
            return Some(cp.path);
        }
    }

    tracing::debug!("No configuration file found in standard locations");
    None
}

/// Load configuration from the specified path
pub fn load_config(path: &Path) -> crate::Result<ConfigFile> {
    tracing::debug!("Loading configuration from: {}", path.display());

    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(ConfigFile {
        path: path.to_path_buf(),
        config,
    })
}

/// Load configuration from a specific path or fall back to default locations
///
/// An explicit path must exist. Without one, the first file found in the
/// standard locations is used, or the built-in defaults if there is none.
pub fn load_config_from_path_or_default(path: Option<&Path>) -> crate::Result<ConfigFile> {
    match path {
        Some(p) => load_config(p),
        None => match find_config_file() {
            Some(found) => load_config(&found),
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(ConfigFile {
                    path: PathBuf::new(),
                    config: Config::default(),
                })
            }
        },
    }
}
