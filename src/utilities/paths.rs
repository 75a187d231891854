//! Path management for persona storage.

use std::env;
use std::path::PathBuf;

/// Default database file name.
pub const DEFAULT_DB_FILE: &str = "zoral_npc.sqlite";

/// Returns the platform data directory used for SQLite storage.
///
/// `ZORAL_STORAGE_DIR` overrides the directory outright. Otherwise:
/// - Linux: `~/.local/share/Zoral`
/// - macOS: `~/Library/Application Support/Zoral`
/// - Windows: `%LOCALAPPDATA%\Zoral`
pub fn db_storage_dir() -> PathBuf {
    if let Ok(dir) = env::var("ZORAL_STORAGE_DIR") {
        return PathBuf::from(dir);
    }

    let app_name = "Zoral";
    if cfg!(target_os = "macos") {
        let home = env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join(app_name)
    } else if cfg!(target_os = "windows") {
        let local_app_data = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("APPDATA").unwrap_or_else(|_| "C:\\tmp".to_string()));
        PathBuf::from(local_app_data).join(app_name)
    } else {
        let home = env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".local").join("share").join(app_name)
    }
}

/// Default location of the persona database.
pub fn default_db_path() -> PathBuf {
    db_storage_dir().join(DEFAULT_DB_FILE)
}
