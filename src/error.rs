use thiserror::Error;

use crate::data::DatabaseError;

/// Failures surfaced by a vtable dump run
#[derive(Error, Debug)]
pub enum DumpError {
    #[error("device not connected: {device} (connected: {connected})")]
    DeviceNotFound { device: String, connected: String },

    #[error("service {service} not in db for {device}, run interface onTransact enumeration first")]
    ServiceNotDiscovered { service: String, device: String },

    #[error("invalid service target: {0}")]
    InvalidTarget(String),

    #[error("agent channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("session deadline of {0}s expired")]
    Timeout(u64),

    #[error("no vtable payload received from agent")]
    CaptureMissing,

    #[error("malformed agent message: {0}")]
    MalformedMessage(String),

    #[error("agent call {export} failed: {message}")]
    Rpc { export: String, message: String },

    #[error("instrumentation bridge error: {0}")]
    Bridge(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DumpError {
    /// Short machine-friendly name for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            DumpError::DeviceNotFound { .. } => "device_not_found",
            DumpError::ServiceNotDiscovered { .. } => "service_not_discovered",
            DumpError::InvalidTarget(_) => "invalid_target",
            DumpError::ChannelUnavailable(_) => "channel_unavailable",
            DumpError::Timeout(_) => "timeout",
            DumpError::CaptureMissing => "capture_missing",
            DumpError::MalformedMessage(_) => "malformed_message",
            DumpError::Rpc { .. } => "rpc",
            DumpError::Bridge(_) => "bridge",
            DumpError::Io(_) => "io",
            DumpError::Store(_) => "store",
            DumpError::Config(_) => "config",
        }
    }
}

impl DumpError {
    /// Process exit status for this failure. Every failure exits with `-1`
    /// as seen by a shell, i.e. 255.
    pub fn exit_code(&self) -> u8 {
        255
    }
}
