//! Default paths for appwarden components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/appwarden/wardend.sock` or `/tmp/appwarden-$USER/wardend.sock`
//! - Data: `$XDG_DATA_HOME/appwarden` or `~/.local/share/appwarden`
//! - Config: `$XDG_CONFIG_HOME/appwarden/config.toml` or `~/.config/appwarden/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const APPWARDEN_SOCKET_ENV: &str = "APPWARDEN_SOCKET";

/// Environment variable for overriding the data directory
pub const APPWARDEN_DATA_DIR_ENV: &str = "APPWARDEN_DATA_DIR";

/// Socket filename within the socket directory
const SOCKET_FILENAME: &str = "wardend.sock";

/// Pid file written by the running daemon
const PID_FILENAME: &str = "wardend.pid";

/// SQLite database filename within the data directory
const DB_FILENAME: &str = "appwarden.db";

/// Application subdirectory name
const APP_DIR: &str = "appwarden";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$APPWARDEN_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/appwarden/wardend.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/appwarden-$USER/wardend.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(APPWARDEN_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking the APPWARDEN_SOCKET env var.
pub fn socket_path_without_env() -> PathBuf {
    runtime_dir().join(SOCKET_FILENAME)
}

/// Directory for runtime state (socket, pid file)
pub fn runtime_dir() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username))
}

/// Default pid file location for the daemon
pub fn default_pid_path() -> PathBuf {
    runtime_dir().join(PID_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$APPWARDEN_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/appwarden` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/appwarden` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(APPWARDEN_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the APPWARDEN_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Database path inside a data directory
pub fn db_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DB_FILENAME)
}

/// Get the default configuration file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/appwarden/config.toml`
/// 2. `~/.config/appwarden/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml");
    }

    PathBuf::from("/etc").join(APP_DIR).join("config.toml")
}
