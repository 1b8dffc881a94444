//! MedCross engine: cross-chain medical record index and authorization
//! service.
//!
//! Assembles the crates below into a single facade:
//!
//! - `medcross-adapters` normalizes Ethereum and Fabric events and
//!   submits authorization transactions,
//! - `medcross-reconciler` orders and deduplicates ingestion,
//! - `medcross-index` persists records, authorizations, and the audit
//!   log,
//! - `medcross-query` serves access-controlled reads.

pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;

pub use config::{load_config, load_config_from_str, EngineConfig};
pub use error::{ConfigError, EngineError, EngineResult};
pub use service::MedCrossEngine;
pub use telemetry::init_tracing;
