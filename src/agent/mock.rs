//! Mock agent transport for deterministic testing
//!
//! Implements [`AgentTransport`] by emitting pre-configured agent payloads
//! without touching a device. Payloads can be emitted when the agent loads or
//! right after a given export is called, which is enough to script the whole
//! readiness/configure/instrument/capture flow.
//!
//! # Example
//! ```no_run
//! use vtable_dumper::agent::mock::{MockConfig, MockTransport};
//! use serde_json::json;
//!
//! let transport = MockTransport::new(
//!     MockConfig::default()
//!         .emit_on_load(json!({"type": "setup_done"}))
//!         .emit_after("instrument", json!({"0": {"offset": 16, "module": "libfoo.so"}})),
//! );
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::agent::message::RawMessage;
use crate::agent::transport::AgentTransport;
use crate::error::DumpError;

/// When a scripted payload is emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitAt {
    Load,
    AfterCall(String),
}

/// Configuration for mock agent behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Payloads to emit, in order, with their trigger
    pub script: Vec<(EmitAt, Value)>,
    /// Delay before each emitted payload (simulates agent latency)
    pub event_delay: Duration,
    /// Whether load() should fail
    pub fail_on_load: bool,
    /// Exports that reply with an error, keyed by export name
    pub failing_calls: HashMap<String, String>,
    /// Whether unload() should report an error (agent already gone)
    pub fail_on_unload: bool,
}

impl MockConfig {
    /// Emit a payload as soon as the agent is loaded
    pub fn emit_on_load(mut self, payload: Value) -> Self {
        self.script.push((EmitAt::Load, payload));
        self
    }

    /// Emit a payload after the named export has replied
    pub fn emit_after(mut self, export: impl Into<String>, payload: Value) -> Self {
        self.script.push((EmitAt::AfterCall(export.into()), payload));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_on_load = true;
        self
    }

    pub fn failing_call(mut self, export: impl Into<String>, message: impl Into<String>) -> Self {
        self.failing_calls.insert(export.into(), message.into());
        self
    }

    pub fn failing_unload(mut self) -> Self {
        self.fail_on_unload = true;
        self
    }
}

/// A recorded export call
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub export: String,
    pub args: Vec<Value>,
}

/// Mock transport for testing
///
/// Emitted payloads go through one emitter task so they reach the sink in
/// script order even with a delay configured.
pub struct MockTransport {
    config: MockConfig,
    emitter: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    load_count: Arc<Mutex<usize>>,
    unload_count: Arc<Mutex<usize>>,
}

impl MockTransport {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            emitter: Mutex::new(None),
            calls: Arc::new(Mutex::new(Vec::new())),
            load_count: Arc::new(Mutex::new(0)),
            unload_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Recorded export calls, in call order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.export.clone()).collect()
    }

    pub fn load_count(&self) -> usize {
        *self.load_count.lock()
    }

    pub fn unload_count(&self) -> usize {
        *self.unload_count.lock()
    }

    pub fn is_loaded(&self) -> bool {
        self.emitter.lock().is_some()
    }

    fn emit(&self, trigger: &EmitAt) {
        let guard = self.emitter.lock();
        let Some(emitter) = guard.as_ref() else {
            return;
        };
        for (at, payload) in &self.config.script {
            if at == trigger && emitter.send(payload.clone()).is_err() {
                break; // Emitter task gone
            }
        }
    }
}

#[async_trait]
impl AgentTransport for MockTransport {
    async fn load(&self, sink: mpsc::Sender<RawMessage>) -> Result<(), DumpError> {
        *self.load_count.lock() += 1;

        if self.config.fail_on_load {
            return Err(DumpError::Bridge("mock load failure".into()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let delay = self.config.event_delay;
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
                if sink.send(RawMessage::send(&payload)).await.is_err() {
                    break; // Receiver dropped
                }
            }
        });

        *self.emitter.lock() = Some(tx);
        self.emit(&EmitAt::Load);
        Ok(())
    }

    async fn call(&self, export: &str, args: Vec<Value>) -> Result<Value, DumpError> {
        if !self.is_loaded() {
            return Err(DumpError::ChannelUnavailable("mock agent not loaded".into()));
        }

        self.calls.lock().push(MockCall {
            export: export.to_string(),
            args,
        });

        if let Some(message) = self.config.failing_calls.get(export) {
            return Err(DumpError::Rpc {
                export: export.to_string(),
                message: message.clone(),
            });
        }

        self.emit(&EmitAt::AfterCall(export.to_string()));
        Ok(Value::Null)
    }

    async fn unload(&self) -> Result<(), DumpError> {
        *self.unload_count.lock() += 1;
        self.emitter.lock().take();

        if self.config.fail_on_unload {
            return Err(DumpError::Bridge("mock agent already detached".into()));
        }
        Ok(())
    }
}
