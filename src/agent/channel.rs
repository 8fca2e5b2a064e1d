//! Host side of the agent message channel
//!
//! The transport pushes raw runtime messages into an mpsc queue; a single pump
//! task drains it and feeds [`AgentChannel::handle`], so messages are handled
//! one at a time in emission order. The readiness flag is published through a
//! watch channel and the captured table through a mutex-guarded slot, both
//! readable from the controlling task at any time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::agent::message::{AgentMessage, CapturedTable, RawMessage, ScriptMessage};
use crate::logging::SessionLog;

/// Queue depth between the transport and the message pump
pub const MESSAGE_QUEUE_DEPTH: usize = 256;

struct ChannelState {
    ready: watch::Sender<bool>,
    capture: Mutex<Option<CapturedTable>>,
    captures_seen: AtomicUsize,
    messages_seen: AtomicUsize,
}

#[derive(Clone)]
pub struct AgentChannel {
    state: Arc<ChannelState>,
    log: SessionLog,
}

impl AgentChannel {
    pub fn new(log: SessionLog) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            state: Arc::new(ChannelState {
                ready,
                capture: Mutex::new(None),
                captures_seen: AtomicUsize::new(0),
                messages_seen: AtomicUsize::new(0),
            }),
            log,
        }
    }

    /// Create the transport-facing queue and start draining it into [`handle`](Self::handle).
    ///
    /// Call this before loading the agent so that nothing it emits during
    /// load can be missed.
    pub fn open(&self) -> (mpsc::Sender<RawMessage>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<RawMessage>(MESSAGE_QUEUE_DEPTH);
        let channel = self.clone();
        let pump = tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                channel.handle(raw);
            }
            channel.log.debug("agent message queue closed");
        });
        (tx, pump)
    }

    /// Classify and apply one runtime message.
    pub fn handle(&self, raw: RawMessage) {
        self.state.messages_seen.fetch_add(1, Ordering::Relaxed);
        self.log.debug(&format!("on_message: {}", raw.message));

        let payload = match ScriptMessage::parse(&raw) {
            Ok(ScriptMessage::Send { payload }) => payload,
            Ok(ScriptMessage::Log { level, payload }) => {
                self.log.debug(&format!(
                    "agent log [{}]: {}",
                    level.as_deref().unwrap_or("info"),
                    payload
                ));
                return;
            }
            Ok(ScriptMessage::Error { description, stack }) => {
                tracing::error!(
                    device = %self.log.device_id(),
                    session = %self.log.session_id(),
                    description = description.as_deref().unwrap_or(""),
                    stack = stack.as_deref().unwrap_or(""),
                    "agent script error"
                );
                return;
            }
            Ok(ScriptMessage::Other) => return,
            Err(err) => {
                tracing::warn!(
                    device = %self.log.device_id(),
                    session = %self.log.session_id(),
                    error = %err,
                    "dropping agent message"
                );
                return;
            }
        };

        match AgentMessage::from_payload(&payload) {
            Ok(AgentMessage::Control(control)) => {
                if control.is_setup_done() {
                    self.state.ready.send_if_modified(|ready| {
                        let changed = !*ready;
                        *ready = true;
                        changed
                    });
                } else {
                    self.log
                        .debug(&format!("ignoring control message type {}", control.kind));
                }
            }
            Ok(AgentMessage::Capture(table)) => {
                let previous = self.state.captures_seen.fetch_add(1, Ordering::SeqCst);
                if previous > 0 {
                    tracing::warn!(
                        device = %self.log.device_id(),
                        session = %self.log.session_id(),
                        captures = previous + 1,
                        "replacing previously captured vtable"
                    );
                }
                *self.state.capture.lock() = Some(table);
            }
            Err(err) => {
                tracing::warn!(
                    device = %self.log.device_id(),
                    session = %self.log.session_id(),
                    error = %err,
                    "dropping agent payload"
                );
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.state.ready.borrow()
    }

    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.state.ready.subscribe()
    }

    /// Copy of the current capture, if any
    pub fn capture(&self) -> Option<CapturedTable> {
        self.state.capture.lock().clone()
    }

    pub fn take_capture(&self) -> Option<CapturedTable> {
        self.state.capture.lock().take()
    }

    /// Number of capture payloads accepted so far
    pub fn captures_seen(&self) -> usize {
        self.state.captures_seen.load(Ordering::SeqCst)
    }

    pub fn messages_seen(&self) -> usize {
        self.state.messages_seen.load(Ordering::Relaxed)
    }
}
