//! Default paths for arcaded components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/arcaded/arcaded.sock` or `/tmp/arcaded-$USER/arcaded.sock`
//! - Data: `$XDG_DATA_HOME/arcaded` or `~/.local/share/arcaded`
//! - Config: `$XDG_CONFIG_HOME/arcade/tariff.toml` or `~/.config/arcade/tariff.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const ARCADE_SOCKET_ENV: &str = "ARCADE_SOCKET";

/// Environment variable for overriding the data directory
pub const ARCADE_DATA_DIR_ENV: &str = "ARCADE_DATA_DIR";

const SOCKET_FILENAME: &str = "arcaded.sock";
const CONFIG_FILENAME: &str = "tariff.toml";
const APP_DIR: &str = "arcaded";
const CONFIG_APP_DIR: &str = "arcade";

/// Socket path without consulting `ARCADE_SOCKET`; clap reads the env var
/// itself for the CLI override.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Data directory (holds the SQLite database)
pub fn default_data_dir() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Tariff configuration file
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home)
            .join(CONFIG_APP_DIR)
            .join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(CONFIG_APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(CONFIG_APP_DIR).join(CONFIG_FILENAME)
}
