//! Provoking one pass through the instrumented onTransact

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;

use crate::session::ServiceTarget;

/// Transaction code sent to the service. It only has to reach onTransact,
/// the service is free to reject it.
pub const DEFAULT_STIMULUS_CODE: u32 = 69;

/// What happened when the stimulus was sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusReport {
    pub command: String,
    /// Error text for diagnostics; the outcome is not judged by it
    pub error: Option<String>,
}

#[async_trait]
pub trait Stimulus: Send + Sync {
    async fn fire(&self, target: &ServiceTarget) -> StimulusReport;
}

/// Sends `service call <name> <code>` through `adb shell` with a privilege prefix
#[derive(Debug, Clone)]
pub struct AdbStimulus {
    pub adb: PathBuf,
    /// Words placed before the command, e.g. `su 0`
    pub privileged_prefix: Vec<String>,
    pub code: u32,
}

impl AdbStimulus {
    pub fn new(adb: PathBuf, privileged_prefix: Vec<String>, code: u32) -> Self {
        Self {
            adb,
            privileged_prefix,
            code,
        }
    }

    /// The on-device command line
    pub fn shell_command(&self, service_name: &str) -> String {
        let mut words = self.privileged_prefix.clone();
        words.push(format!("service call {} {}", service_name, self.code));
        words.join(" ")
    }
}

#[async_trait]
impl Stimulus for AdbStimulus {
    async fn fire(&self, target: &ServiceTarget) -> StimulusReport {
        let command = self.shell_command(&target.service_name);
        let output = Command::new(&self.adb)
            .arg("-s")
            .arg(&target.device_id)
            .arg("shell")
            .arg(&command)
            .output()
            .await;

        let error = match output {
            Ok(out) if out.status.success() => None,
            Ok(out) => Some(format!(
                "{}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(err) => Some(err.to_string()),
        };

        if let Some(ref error) = error {
            tracing::warn!(command = %command, error = %error, "stimulus command failed");
        } else {
            tracing::debug!(command = %command, "stimulus sent");
        }

        StimulusReport { command, error }
    }
}

/// Stimulus that only records the targets it was fired at
#[derive(Debug, Clone, Default)]
pub struct RecordingStimulus {
    fired: Arc<Mutex<Vec<String>>>,
    error: Option<String>,
}

impl RecordingStimulus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this error on every fire
    pub fn failing(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Service names the stimulus was fired at
    pub fn fired(&self) -> Vec<String> {
        self.fired.lock().clone()
    }
}

#[async_trait]
impl Stimulus for RecordingStimulus {
    async fn fire(&self, target: &ServiceTarget) -> StimulusReport {
        self.fired.lock().push(target.service_name.clone());
        StimulusReport {
            command: format!("service call {} {}", target.service_name, DEFAULT_STIMULUS_CODE),
            error: self.error.clone(),
        }
    }
}
