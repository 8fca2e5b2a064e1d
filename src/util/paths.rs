//! Path utilities for the vtable dumper data directory

use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "VTABLE_DUMP_HOME";

/// Global storage for custom data directory path
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the data directory with an optional custom path.
/// Must be called early in main() before any other path functions are used.
/// If custom_path is None, uses `$VTABLE_DUMP_HOME` or ~/.vtable-dump.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let path = custom_path.unwrap_or_else(default_data_dir);
    // Ignore error if already set (shouldn't happen in normal usage)
    if DATA_DIR.set(path.clone()).is_err() {
        let existing = DATA_DIR
            .get()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        tracing::debug!(
            path = %path.display(),
            existing = %existing,
            "Data directory already initialized"
        );
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|h| h.join(".vtable-dump"))
        .unwrap_or_else(|| PathBuf::from(".vtable-dump"))
}

/// Get the base data directory.
pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

/// Get the discovery store path (<data_dir>/binder.db)
pub fn database_path() -> PathBuf {
    data_dir().join("binder.db")
}

/// Get the logs directory (<data_dir>/logs)
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Get the default log file path (<data_dir>/logs/vtable_dump.log)
pub fn log_file_path() -> PathBuf {
    logs_dir().join("vtable_dump.log")
}

/// Get the config file path (<data_dir>/config.toml)
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Root under which per-device output trees are written (<data_dir>/targets)
pub fn targets_dir() -> PathBuf {
    data_dir().join("targets")
}

/// Default agent script location (<data_dir>/agent/dump_vtable.js)
pub fn agent_script_path() -> PathBuf {
    data_dir().join("agent").join("dump_vtable.js")
}
