use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::agent::message::RawMessage;
use crate::error::DumpError;

/// Link to an instrumentation agent living in the target process
///
/// Implementations own the injected agent for the duration of one session.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Load the agent. Every message it emits from now on is pushed into
    /// `sink` in emission order.
    async fn load(&self, sink: mpsc::Sender<RawMessage>) -> Result<(), DumpError>;

    /// Invoke an exported agent function and wait for its reply
    async fn call(&self, export: &str, args: Vec<Value>) -> Result<Value, DumpError>;

    /// Unload the agent and detach. Must succeed on an already detached agent.
    async fn unload(&self) -> Result<(), DumpError>;
}
