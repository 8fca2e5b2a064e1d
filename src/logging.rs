//! Log sink setup and the per-session logger

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use uuid::Uuid;

use crate::config::LogConfig;

/// Install the global tracing subscriber writing to the configured log file.
///
/// `RUST_LOG` directives are honored on top of the configured level.
pub fn init(config: &LogConfig) -> std::io::Result<()> {
    if let Some(parent) = config.file.parent() {
        fs::create_dir_all(parent)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)?;

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false) // Disable ANSI colors in log file
        .with_target(true)
        .init();

    Ok(())
}

/// Logger owned by one dump session.
///
/// Every record carries the device and session identifiers. Operator-facing
/// lines are echoed to stdout as `[DMP][<device>] <line>`.
#[derive(Debug, Clone)]
pub struct SessionLog {
    device_id: String,
    session_id: Uuid,
    echo: bool,
}

impl SessionLog {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            session_id: Uuid::new_v4(),
            echo: true,
        }
    }

    /// Keep records in the log file only
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Span that scopes every record of the session
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "vtable_dump",
            device = %self.device_id,
            session = %self.session_id
        )
    }

    /// Operator-facing progress line
    pub fn info(&self, line: &str) {
        tracing::info!(device = %self.device_id, session = %self.session_id, "{line}");
        self.echo(line.to_string());
    }

    /// Diagnostic-only record, not shown to the operator
    pub fn debug(&self, line: &str) {
        tracing::debug!(device = %self.device_id, session = %self.session_id, "{line}");
    }

    pub fn warn(&self, line: &str) {
        tracing::warn!(device = %self.device_id, session = %self.session_id, "{line}");
        self.echo(line.to_string());
    }

    fn echo(&self, line: String) {
        if !self.echo {
            return;
        }
        // A closed stdout must not interrupt message handling
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "[DMP][{}] {}", self.device_id, line);
    }
}
