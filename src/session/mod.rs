//! Instrumentation session controller

pub mod controller;
pub mod state;
pub mod target;

pub use controller::{DumpSession, SessionOutcome, SessionTiming};
pub use state::SessionState;
pub use target::ServiceTarget;
