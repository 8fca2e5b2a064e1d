//! Shared test utilities
//!
//! - A discovery store seeded in a temporary directory
//! - Sample targets and agent payloads

pub mod fixtures;
