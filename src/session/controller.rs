//! Drives one dump session from agent load to cleanup

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::agent::{AgentChannel, AgentTransport, CapturedTable, RemoteControl};
use crate::error::DumpError;
use crate::logging::SessionLog;
use crate::session::state::SessionState;
use crate::session::target::ServiceTarget;
use crate::stimulus::{Stimulus, StimulusReport};

/// Wait policy of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// How often the readiness wait reports that it is still waiting
    pub ready_poll_interval: Duration,
    /// Upper bound for the whole session before cleanup
    pub deadline: Duration,
    /// Grace period after the stimulus for the capture to arrive.
    ///
    /// This is a heuristic: the agent usually reports well within it, but
    /// nothing guarantees that.
    pub capture_delay: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            ready_poll_interval: Duration::from_secs(1),
            deadline: Duration::from_secs(10 * 60),
            capture_delay: Duration::from_secs(1),
        }
    }
}

/// Result of a finished session. The state is always `CleanedUp`; success
/// is carried by `table`.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub state: SessionState,
    /// Every state the session went through, starting at `Init`
    pub history: Vec<SessionState>,
    pub table: Option<CapturedTable>,
    pub error: Option<DumpError>,
    pub stimulus: Option<StimulusReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionOutcome {
    pub fn is_captured(&self) -> bool {
        self.table.is_some()
    }

    pub fn passed_through(&self, state: SessionState) -> bool {
        self.history.contains(&state)
    }
}

pub struct DumpSession {
    target: ServiceTarget,
    control: RemoteControl,
    stimulus: Arc<dyn Stimulus>,
    timing: SessionTiming,
    log: SessionLog,
    channel: AgentChannel,
    state: SessionState,
    history: Vec<SessionState>,
    pump: Option<JoinHandle<()>>,
    stimulus_report: Option<StimulusReport>,
}

impl DumpSession {
    pub fn new(
        target: ServiceTarget,
        transport: Arc<dyn AgentTransport>,
        stimulus: Arc<dyn Stimulus>,
        log: SessionLog,
    ) -> Self {
        Self {
            target,
            control: RemoteControl::new(transport),
            stimulus,
            timing: SessionTiming::default(),
            channel: AgentChannel::new(log.clone()),
            log,
            state: SessionState::Init,
            history: vec![SessionState::Init],
            pump: None,
            stimulus_report: None,
        }
    }

    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Run the session to completion. Cleanup always runs.
    pub async fn run(self) -> SessionOutcome {
        let span = self.log.span();
        tracing::Instrument::instrument(self.run_inner(), span).await
    }

    async fn run_inner(mut self) -> SessionOutcome {
        let started_at = Utc::now();
        let deadline_secs = self.timing.deadline.as_secs();
        let deadline = Instant::now() + self.timing.deadline;

        let result = match tokio::time::timeout_at(deadline, self.drive()).await {
            Ok(result) => result,
            Err(_) => Err(DumpError::Timeout(deadline_secs)),
        };

        let (table, error) = match result {
            Ok(table) => {
                self.transition(SessionState::Captured);
                self.log
                    .info(&format!("captured {} vtable slots", table.len()));
                self.log.debug(&format!("vtable dump: {:?}", table));
                (Some(table), None)
            }
            Err(err) => {
                self.transition(SessionState::Failed);
                tracing::error!(kind = err.kind(), state = %self.history_before_failure(), "session failed");
                (None, Some(err))
            }
        };

        self.cleanup().await;
        self.transition(SessionState::CleanedUp);

        SessionOutcome {
            session_id: self.log.session_id(),
            state: self.state,
            history: self.history,
            table,
            error,
            stimulus: self.stimulus_report,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn drive(&mut self) -> Result<CapturedTable, DumpError> {
        self.target.validate()?;

        self.transition(SessionState::Loading);
        self.log.info("loading agent script");
        // Handler is running before the agent can emit anything
        let (sink, pump) = self.channel.open();
        self.pump = Some(pump);
        self.control.load(sink).await?;

        self.transition(SessionState::AwaitingReady);
        self.wait_ready().await?;

        self.transition(SessionState::Configuring);
        self.control
            .configure(
                self.target.dispatch_entry_addr,
                self.target.module_basename(),
                &self.target.base_object_path,
                &self.target.dispatch_module_name,
            )
            .await?;

        self.transition(SessionState::Arming);
        self.control.instrument().await?;

        self.transition(SessionState::AwaitingCapture);
        let report = self.stimulus.fire(&self.target).await;
        if let Some(ref error) = report.error {
            self.log
                .warn(&format!("stimulus `{}` reported: {error}", report.command));
        }
        self.stimulus_report = Some(report);

        tokio::time::sleep(self.timing.capture_delay).await;

        match self.channel.take_capture() {
            Some(table) => Ok(table),
            None => {
                self.log.info(&format!(
                    "vtable dump: None ({} agent messages seen)",
                    self.channel.messages_seen()
                ));
                Err(DumpError::CaptureMissing)
            }
        }
    }

    async fn wait_ready(&self) -> Result<(), DumpError> {
        let mut ready = self.channel.subscribe_ready();
        let mut ticker = tokio::time::interval(self.timing.ready_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *ready.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                changed = ready.changed() => {
                    if changed.is_err() {
                        return Err(DumpError::ChannelUnavailable(
                            "readiness signal dropped".into(),
                        ));
                    }
                }
                _ = ticker.tick() => {
                    if self.pump.as_ref().is_some_and(|pump| pump.is_finished()) {
                        return Err(DumpError::ChannelUnavailable(
                            "agent channel closed before setup_done".into(),
                        ));
                    }
                    self.log.info("waiting for agent script to come up...");
                }
            }
        }
    }

    async fn cleanup(&mut self) {
        if let Err(err) = self.control.unload().await {
            tracing::warn!(error = %err, "agent unload failed, continuing cleanup");
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "unexpected session transition");
        }
        tracing::debug!(from = %self.state, to = %next, "session transition");
        self.state = next;
        self.history.push(next);
    }

    /// Last active state before the session failed
    fn history_before_failure(&self) -> SessionState {
        self.history
            .iter()
            .rev()
            .find(|state| **state != SessionState::Failed)
            .copied()
            .unwrap_or(SessionState::Init)
    }
}
