pub mod bridge;
pub mod channel;
pub mod message;
pub mod mock;
pub mod rpc;
pub mod transport;

pub use bridge::{BridgeConfig, BridgeTransport};
pub use channel::AgentChannel;
pub use message::{
    AgentMessage, CapturedTable, ControlMessage, RawMessage, ScriptMessage, SlotKey, VtableEntry,
};
pub use rpc::RemoteControl;
pub use transport::AgentTransport;
