use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::DumpError;

/// Control message type the agent sends once its own initialization is done
pub const SETUP_DONE: &str = "setup_done";

/// A message exactly as delivered by the instrumentation runtime
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Runtime envelope (`{"type": "send", "payload": ...}`, `{"type": "log", ...}`, ...)
    pub message: Value,
    /// Optional binary blob attached to the message (unused by the dumper)
    pub data: Option<Vec<u8>>,
}

impl RawMessage {
    pub fn new(message: Value) -> Self {
        Self {
            message,
            data: None,
        }
    }

    /// Wrap an agent payload the way the runtime does for `send()`
    ///
    /// The dump agent stringifies its payloads, so the payload travels as a
    /// JSON string inside the envelope.
    pub fn send(payload: &Value) -> Self {
        Self::new(serde_json::json!({
            "type": "send",
            "payload": payload.to_string(),
        }))
    }
}

/// Runtime-level envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptMessage {
    Send {
        payload: Value,
    },
    Log {
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        payload: Value,
    },
    Error {
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        stack: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl ScriptMessage {
    pub fn parse(raw: &RawMessage) -> Result<Self, DumpError> {
        serde_json::from_value(raw.message.clone())
            .map_err(|e| DumpError::MalformedMessage(format!("bad runtime envelope: {e}")))
    }
}

/// Control message from the agent (envelope carrying a `type` field)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub kind: String,
}

impl ControlMessage {
    pub fn is_setup_done(&self) -> bool {
        self.kind == SETUP_DONE
    }
}

/// Classified agent payload
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    Control(ControlMessage),
    Capture(CapturedTable),
}

impl AgentMessage {
    /// Classify the payload of a `send` envelope.
    ///
    /// String payloads are decoded as JSON first. An object with a `type`
    /// key is a control message, any other object must be a vtable capture.
    pub fn from_payload(payload: &Value) -> Result<Self, DumpError> {
        match payload {
            Value::String(encoded) => {
                let decoded: Value = serde_json::from_str(encoded).map_err(|e| {
                    DumpError::MalformedMessage(format!("payload is not valid JSON: {e}"))
                })?;
                Self::from_envelope(&decoded)
            }
            other => Self::from_envelope(other),
        }
    }

    fn from_envelope(envelope: &Value) -> Result<Self, DumpError> {
        let Some(object) = envelope.as_object() else {
            return Err(DumpError::MalformedMessage(format!(
                "expected an object payload, got {envelope}"
            )));
        };

        if let Some(kind) = object.get("type") {
            let kind = kind.as_str().ok_or_else(|| {
                DumpError::MalformedMessage(format!("control type is not a string: {kind}"))
            })?;
            return Ok(AgentMessage::Control(ControlMessage {
                kind: kind.to_string(),
            }));
        }

        CapturedTable::from_object(object).map(AgentMessage::Capture)
    }
}

/// Vtable slot index as the hex string the agent reports (without `0x`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey(String);

impl SlotKey {
    pub fn parse(raw: &str) -> Result<Self, DumpError> {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DumpError::MalformedMessage(format!(
                "slot key is not a hex index: {raw:?}"
            )));
        }
        Ok(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.0)
    }
}

/// One resolved vtable slot
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VtableEntry {
    #[serde(rename = "offset")]
    pub resolved_offset: i64,
    pub module: String,
}

/// Captured vtable, kept in the order the agent produced it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedTable {
    entries: Vec<(SlotKey, VtableEntry)>,
}

impl CapturedTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_object(object: &Map<String, Value>) -> Result<Self, DumpError> {
        let mut table = Self::new();
        for (key, value) in object {
            let slot = SlotKey::parse(key)?;
            let entry: VtableEntry = serde_json::from_value(value.clone()).map_err(|e| {
                DumpError::MalformedMessage(format!("bad vtable entry for slot {key}: {e}"))
            })?;
            table.insert(slot, entry);
        }
        Ok(table)
    }

    /// Insert a slot. A repeated key replaces the entry but keeps its position.
    pub fn insert(&mut self, slot: SlotKey, entry: VtableEntry) {
        match self.entries.iter_mut().find(|(key, _)| *key == slot) {
            Some((_, existing)) => *existing = entry,
            None => self.entries.push((slot, entry)),
        }
    }

    pub fn get(&self, slot: &SlotKey) -> Option<&VtableEntry> {
        self.entries
            .iter()
            .find(|(key, _)| key == slot)
            .map(|(_, entry)| entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotKey, &VtableEntry)> {
        self.entries.iter().map(|(key, entry)| (key, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
