//! Capture the onTransact vtable of a native binder service.
//!
//! An instrumentation agent is injected into the service process, configured
//! with the onTransact location recorded by interface discovery, armed, and
//! then stimulated with a binder call. The vtable it reports is written under
//! the per-device output tree.

pub mod agent;
pub mod app;
pub mod capture;
pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod logging;
pub mod session;
pub mod stimulus;
pub mod util;

pub use agent::{AgentTransport, CapturedTable, SlotKey, VtableEntry};
pub use app::{dump, resolve_target, DumpReport};
pub use config::Config;
pub use data::{Database, ServiceRecord, ServiceStore};
pub use error::DumpError;
pub use session::{DumpSession, ServiceTarget, SessionOutcome, SessionState, SessionTiming};
