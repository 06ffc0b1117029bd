//! Default paths for usherd components
//!
//! Provides centralized path defaults that all crates can use.
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/usherd/usherd.sock` or `/tmp/usherd-$USER/usherd.sock`
//! - Data: `$XDG_DATA_HOME/usherd` or `~/.local/share/usherd`
//! - Logs: `$XDG_STATE_HOME/usherd` or `~/.local/state/usherd`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const USHER_SOCKET_ENV: &str = "USHER_SOCKET";

/// Environment variable for overriding the data directory
pub const USHER_DATA_DIR_ENV: &str = "USHER_DATA_DIR";

/// Socket filename within the socket directory
const SOCKET_FILENAME: &str = "usherd.sock";

/// Application subdirectory name
const APP_DIR: &str = "usherd";

/// Get the default configuration file path:
/// `$XDG_CONFIG_HOME/usher/config.toml` or `~/.config/usher/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join("usher").join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("usher")
            .join("config.toml");
    }

    PathBuf::from("/etc/usher/config.toml")
}

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$USHER_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/usherd/usherd.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/usherd-$USER/usherd.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(USHER_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking the USHER_SOCKET env var.
/// Used for default values in configs where the env var is checked separately.
pub fn socket_path_without_env() -> PathBuf {
    // Try XDG_RUNTIME_DIR first (typically /run/user/<uid>)
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    // Fallback to /tmp with username
    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$USHER_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/usherd` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/usherd` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(USHER_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the USHER_DATA_DIR env var.
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

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default log directory.
pub fn default_log_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("logs")
}

/// Get the parent directory of the socket (for creating it)
pub fn socket_dir() -> PathBuf {
    let socket_path = socket_path_without_env();
    socket_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR))
}
