//! Integration tests for the vtable dumper
//!
//! These tests drive the store, session, and output writer together with a
//! scripted agent, plus the binary's failure exits.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli;
pub mod dump_flow;
