//! Subprocess transport to an instrumentation bridge.
//!
//! The bridge attaches to the target process, loads the agent script and
//! relays between the host and the agent using JSON lines over stdio:
//!
//! ```text
//! host   -> bridge  {"id": 3, "method": "call", "export": "ping", "args": []}
//! bridge -> host    {"id": 3, "result": true}
//! bridge -> host    {"id": 4, "error": "script is destroyed"}
//! bridge -> host    {"message": {"type": "send", "payload": "..."}, "data": null}
//! ```

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::agent::message::RawMessage;
use crate::agent::transport::AgentTransport;
use crate::error::DumpError;

/// Default bridge executable name looked up on `PATH`
pub const DEFAULT_BRIDGE_BINARY: &str = "frida-bridge";

/// How long `unload` waits for the bridge to acknowledge before killing it
pub const DEFAULT_UNLOAD_GRACE: Duration = Duration::from_secs(2);

type Reply = Result<Value, String>;

/// How to start the bridge for one target
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub binary: PathBuf,
    pub extra_args: Vec<String>,
    pub device_id: String,
    /// Process the agent is injected into (the service name)
    pub target: String,
    pub script: PathBuf,
    /// Upper bound on the `unload` acknowledgement
    pub unload_grace: Duration,
}

impl BridgeConfig {
    /// Resolve a binary name on `PATH`, keeping it as-is when not found
    pub fn find_binary(name: &str) -> PathBuf {
        which::which(name).unwrap_or_else(|_| PathBuf::from(name))
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.extra_args);
        cmd.arg("--device").arg(&self.device_id);
        cmd.arg("--target").arg(&self.target);
        cmd.arg("--script").arg(&self.script);

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    export: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BridgeFrame {
    Reply {
        id: u64,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<String>,
    },
    Message {
        message: Value,
        #[serde(default)]
        data: Option<Vec<u8>>,
    },
}

// ============================================================================
// Request/reply peer
// ============================================================================

#[derive(Clone)]
struct BridgePeer {
    stdin: Arc<Mutex<ChildStdin>>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>,
    id_counter: Arc<AtomicU64>,
}

impl BridgePeer {
    fn new(stdin: ChildStdin) -> Self {
        Self {
            stdin: Arc::new(Mutex::new(stdin)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            id_counter: Arc::new(AtomicU64::new(1)),
        }
    }

    async fn send(&self, request: &BridgeRequest<'_>) -> io::Result<()> {
        let raw = serde_json::to_string(request)?;
        let mut guard = self.stdin.lock().await;
        guard.write_all(raw.as_bytes()).await?;
        guard.write_all(b"\n").await?;
        guard.flush().await
    }

    async fn request(
        &self,
        method: &str,
        export: Option<&str>,
        args: Vec<Value>,
    ) -> Result<Value, DumpError> {
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = BridgeRequest {
            id,
            method,
            export,
            args,
        };
        if let Err(err) = self.send(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(DumpError::ChannelUnavailable(format!(
                "failed to write to bridge: {err}"
            )));
        }

        let name = export.unwrap_or(method);
        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(DumpError::Rpc {
                export: name.to_string(),
                message,
            }),
            Err(_) => Err(DumpError::ChannelUnavailable(format!(
                "bridge closed before replying to {name}"
            ))),
        }
    }

    async fn resolve(&self, id: u64, reply: Reply) {
        if let Some(tx) = self.pending.lock().await.remove(&id) {
            if tx.send(reply).is_err() {
                tracing::debug!(id, "Dropping bridge reply; caller already gone");
            }
        } else {
            tracing::warn!(id, "Bridge reply for unknown request");
        }
    }

    /// Fail every outstanding request by dropping its reply sender
    async fn close(&self) {
        self.pending.lock().await.clear();
    }
}

// ============================================================================
// Transport
// ============================================================================

struct BridgeLink {
    peer: BridgePeer,
    child: Child,
}

pub struct BridgeTransport {
    config: BridgeConfig,
    link: Mutex<Option<BridgeLink>>,
}

impl BridgeTransport {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            link: Mutex::new(None),
        }
    }

    fn spawn_reader(
        stdout: tokio::process::ChildStdout,
        peer: BridgePeer,
        sink: mpsc::Sender<RawMessage>,
    ) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to read from bridge");
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                tracing::trace!("bridge raw line: {}", line);

                match serde_json::from_str::<BridgeFrame>(line) {
                    Ok(BridgeFrame::Reply { id, result, error }) => {
                        let reply = match error {
                            Some(message) => Err(message),
                            None => Ok(result),
                        };
                        peer.resolve(id, reply).await;
                    }
                    Ok(BridgeFrame::Message { message, data }) => {
                        if sink.send(RawMessage { message, data }).await.is_err() {
                            tracing::debug!("Agent message receiver dropped");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Non-protocol output from bridge: {line}");
                    }
                }
            }
            peer.close().await;
            tracing::debug!("bridge stdout closed");
        });
    }

    fn spawn_stderr_logger(stderr: tokio::process::ChildStderr) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!("bridge stderr: {}", line);
            }
        });
    }

    async fn peer(&self) -> Result<BridgePeer, DumpError> {
        self.link
            .lock()
            .await
            .as_ref()
            .map(|link| link.peer.clone())
            .ok_or_else(|| DumpError::ChannelUnavailable("bridge not running".into()))
    }
}

#[async_trait]
impl AgentTransport for BridgeTransport {
    async fn load(&self, sink: mpsc::Sender<RawMessage>) -> Result<(), DumpError> {
        let mut link = self.link.lock().await;
        if link.is_some() {
            return Err(DumpError::Bridge("agent already loaded".into()));
        }

        let mut cmd = self.config.build_command();
        let mut child = cmd.spawn().map_err(|e| {
            DumpError::Bridge(format!(
                "failed to spawn {}: {e}",
                self.config.binary.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DumpError::Bridge("failed to capture bridge stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DumpError::Bridge("failed to capture bridge stdout".into()))?;
        if let Some(stderr) = child.stderr.take() {
            Self::spawn_stderr_logger(stderr);
        }

        let peer = BridgePeer::new(stdin);
        // Reader owns the sink before the script is loaded
        Self::spawn_reader(stdout, peer.clone(), sink);

        if let Err(err) = peer.request("load", None, vec![]).await {
            let _ = child.kill().await;
            return Err(err);
        }

        *link = Some(BridgeLink { peer, child });
        Ok(())
    }

    async fn call(&self, export: &str, args: Vec<Value>) -> Result<Value, DumpError> {
        let peer = self.peer().await?;
        peer.request("call", Some(export), args).await
    }

    async fn unload(&self) -> Result<(), DumpError> {
        let Some(mut link) = self.link.lock().await.take() else {
            return Ok(());
        };

        let grace = self.config.unload_grace;
        match tokio::time::timeout(grace, link.peer.request("unload", None, vec![])).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => tracing::debug!(error = %err, "bridge unload request failed"),
            Err(_) => tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "bridge did not acknowledge unload, killing it"
            ),
        }
        if let Err(err) = link.child.kill().await {
            tracing::debug!(error = %err, "bridge already exited");
        }
        Ok(())
    }
}
