use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::agent::message::RawMessage;
use crate::agent::transport::AgentTransport;
use crate::error::DumpError;

/// Agent export answering liveness probes
pub const EXPORT_PING: &str = "ping";
/// Agent export receiving the onTransact location
pub const EXPORT_CONFIGURE: &str = "setonstransact";
/// Agent export installing the onTransact hook
pub const EXPORT_INSTRUMENT: &str = "instrument";

/// Synchronous call surface of the dump agent.
///
/// Calls do not check session state; sequencing is the caller's job. Any call
/// made while no agent is loaded fails with `ChannelUnavailable`.
pub struct RemoteControl {
    transport: Arc<dyn AgentTransport>,
    loaded: AtomicBool,
}

impl RemoteControl {
    pub fn new(transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            transport,
            loaded: AtomicBool::new(false),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub async fn load(&self, sink: mpsc::Sender<RawMessage>) -> Result<(), DumpError> {
        self.transport.load(sink).await?;
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Liveness probe. Never fails: any error means "not alive".
    pub async fn ping(&self) -> bool {
        match self.call(EXPORT_PING, vec![]).await {
            Ok(_) => true,
            Err(err) => {
                tracing::info!(error = %err, "attempting to ping failed");
                false
            }
        }
    }

    /// Hand the onTransact location to the agent
    pub async fn configure(
        &self,
        dispatch_entry_addr: u64,
        module_basename: &str,
        base_object_path: &str,
        module_name: &str,
    ) -> Result<(), DumpError> {
        self.call(
            EXPORT_CONFIGURE,
            vec![
                json!(dispatch_entry_addr),
                json!(module_basename),
                json!(base_object_path),
                json!(module_name),
            ],
        )
        .await
        .map(|_| ())
    }

    /// Arm the onTransact hook
    pub async fn instrument(&self) -> Result<(), DumpError> {
        self.call(EXPORT_INSTRUMENT, vec![]).await.map(|_| ())
    }

    /// Unload the agent. No-op when nothing is loaded.
    pub async fn unload(&self) -> Result<(), DumpError> {
        if !self.loaded.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.unload().await
    }

    async fn call(&self, export: &str, args: Vec<Value>) -> Result<Value, DumpError> {
        if !self.is_loaded() {
            return Err(DumpError::ChannelUnavailable(format!(
                "no agent loaded for {export}()"
            )));
        }
        self.transport.call(export, args).await
    }
}
