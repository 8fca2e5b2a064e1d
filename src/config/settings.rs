use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::agent::bridge::DEFAULT_BRIDGE_BINARY;
use crate::error::DumpError;
use crate::session::SessionTiming;
use crate::stimulus::DEFAULT_STIMULUS_CODE;
use crate::util::paths;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the per-device output tree
    pub target_root: PathBuf,
    /// Shared id for devices running the same image
    pub meta_target: Option<String>,
    pub database_path: PathBuf,
    /// Agent script handed to the bridge
    pub agent_script: PathBuf,
    pub bridge: BridgeSettings,
    pub adb: AdbSettings,
    pub timing: TimingSettings,
    /// Transaction code sent with `service call`
    pub stimulus_code: u32,
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub binary: PathBuf,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AdbSettings {
    pub binary: PathBuf,
    /// Words that elevate an on-device shell command
    pub privileged_prefix: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSettings {
    pub ready_poll_interval_ms: u64,
    pub session_deadline_secs: u64,
    pub capture_delay_ms: u64,
    /// How long cleanup waits for the bridge to acknowledge unload
    pub unload_grace_ms: u64,
}

/// Log sink settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub file: PathBuf,
    pub level: tracing::Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_root: paths::targets_dir(),
            meta_target: None,
            database_path: paths::database_path(),
            agent_script: paths::agent_script_path(),
            bridge: BridgeSettings {
                binary: PathBuf::from(DEFAULT_BRIDGE_BINARY),
                extra_args: Vec::new(),
            },
            adb: AdbSettings {
                binary: PathBuf::from("adb"),
                privileged_prefix: vec!["su".into(), "0".into()],
            },
            timing: TimingSettings::default(),
            stimulus_code: DEFAULT_STIMULUS_CODE,
            log: LogConfig {
                file: paths::log_file_path(),
                level: tracing::Level::DEBUG,
            },
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            ready_poll_interval_ms: 1000,
            session_deadline_secs: 600,
            capture_delay_ms: 1000,
            unload_grace_ms: 2000,
        }
    }
}

impl TimingSettings {
    pub fn session_timing(&self) -> SessionTiming {
        SessionTiming {
            ready_poll_interval: Duration::from_millis(self.ready_poll_interval_ms),
            deadline: Duration::from_secs(self.session_deadline_secs),
            capture_delay: Duration::from_millis(self.capture_delay_ms),
        }
    }

    pub fn unload_grace(&self) -> Duration {
        Duration::from_millis(self.unload_grace_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlBridgeConfig {
    pub binary: Option<PathBuf>,
    pub extra_args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlAdbConfig {
    pub binary: Option<PathBuf>,
    pub privileged_prefix: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlTimingConfig {
    pub ready_poll_interval_ms: Option<u64>,
    pub session_deadline_secs: Option<u64>,
    pub capture_delay_ms: Option<u64>,
    pub unload_grace_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlLogConfig {
    pub file: Option<PathBuf>,
    pub level: Option<String>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub target_root: Option<PathBuf>,
    pub meta_target: Option<String>,
    pub database_path: Option<PathBuf>,
    pub agent_script: Option<PathBuf>,
    pub stimulus_code: Option<u32>,
    pub bridge: Option<TomlBridgeConfig>,
    pub adb: Option<TomlAdbConfig>,
    pub timing: Option<TomlTimingConfig>,
    pub log: Option<TomlLogConfig>,
}

impl Config {
    /// Load configuration, merging the file over defaults.
    ///
    /// An explicit path must exist. Without one, `<data_dir>/config.toml` is
    /// used and seeded from the bundled example on first run.
    pub fn load(explicit: Option<&Path>) -> Result<Self, DumpError> {
        let config_file = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(DumpError::Config(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => {
                let path = paths::config_path();
                if !path.exists() {
                    Self::create_default_config(&path);
                }
                path
            }
        };

        if !config_file.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&config_file)?;
        Self::from_toml_str(&contents)
            .map_err(|e| DumpError::Config(format!("{}: {}", config_file.display(), e)))
    }

    /// Parse TOML contents on top of the defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, DumpError> {
        let toml_config: TomlConfig =
            toml::from_str(contents).map_err(|e| DumpError::Config(e.to_string()))?;
        let mut config = Config::default();
        config.merge(toml_config)?;
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig) -> Result<(), DumpError> {
        if let Some(root) = toml_config.target_root {
            self.target_root = expand_home(root);
        }
        if let Some(meta) = toml_config.meta_target.filter(|m| !m.is_empty()) {
            self.meta_target = Some(meta);
        }
        if let Some(db) = toml_config.database_path {
            self.database_path = expand_home(db);
        }
        if let Some(script) = toml_config.agent_script {
            self.agent_script = expand_home(script);
        }
        if let Some(code) = toml_config.stimulus_code {
            self.stimulus_code = code;
        }

        if let Some(bridge) = toml_config.bridge {
            if let Some(binary) = bridge.binary {
                self.bridge.binary = expand_home(binary);
            }
            if let Some(extra_args) = bridge.extra_args {
                self.bridge.extra_args = extra_args;
            }
        }

        if let Some(adb) = toml_config.adb {
            if let Some(binary) = adb.binary {
                self.adb.binary = expand_home(binary);
            }
            if let Some(prefix) = adb.privileged_prefix {
                self.adb.privileged_prefix = prefix;
            }
        }

        if let Some(timing) = toml_config.timing {
            if let Some(ms) = timing.ready_poll_interval_ms {
                self.timing.ready_poll_interval_ms = ms;
            }
            if let Some(secs) = timing.session_deadline_secs {
                self.timing.session_deadline_secs = secs;
            }
            if let Some(ms) = timing.capture_delay_ms {
                self.timing.capture_delay_ms = ms;
            }
            if let Some(ms) = timing.unload_grace_ms {
                self.timing.unload_grace_ms = ms;
            }
        }
        if self.timing.ready_poll_interval_ms == 0 {
            return Err(DumpError::Config(
                "timing.ready_poll_interval_ms must be greater than zero".into(),
            ));
        }

        if let Some(log) = toml_config.log {
            if let Some(file) = log.file {
                self.log.file = expand_home(file);
            }
            if let Some(level) = log.level {
                self.log.level = tracing::Level::from_str(&level)
                    .map_err(|_| DumpError::Config(format!("unknown log level: {}", level)))?;
            }
        }

        Ok(())
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!("Failed to create config directory: {}", e);
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            eprintln!("Failed to write default config: {}", e);
        }
    }

    pub fn with_target_root(mut self, root: PathBuf) -> Self {
        self.target_root = root;
        self
    }

    pub fn with_database_path(mut self, path: PathBuf) -> Self {
        self.database_path = path;
        self
    }

    pub fn with_meta_target(mut self, meta_target: Option<String>) -> Self {
        self.meta_target = meta_target.filter(|m| !m.is_empty());
        self
    }

    pub fn with_agent_script(mut self, script: PathBuf) -> Self {
        self.agent_script = script;
        self
    }

    /// Id the output tree and discovery records are keyed by
    pub fn output_owner<'a>(&'a self, device_id: &'a str) -> &'a str {
        self.meta_target.as_deref().unwrap_or(device_id)
    }
}

fn expand_home(path: PathBuf) -> PathBuf {
    if let (Ok(rest), Some(home)) = (path.strip_prefix("~"), dirs::home_dir()) {
        return home.join(rest);
    }
    path
}
