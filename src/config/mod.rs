mod settings;

pub use settings::{
    AdbSettings, BridgeSettings, Config, LogConfig, TimingSettings, TomlConfig, EXAMPLE_CONFIG,
};
