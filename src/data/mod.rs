//! Discovery store
//!
//! SQLite storage for the services found by interface discovery and the
//! onTransact locations recorded for them.

mod database;
pub mod migrations;
mod models;
mod service;

pub use database::{Database, DatabaseError};
pub use models::{OnTransactInfo, ServiceRecord};
pub use service::ServiceStore;
