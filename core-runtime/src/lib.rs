//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the sync core:
//! - Logging and tracing bootstrap
//! - Configuration management (`CoreConfig`, `SyncOptions`)
//! - Schedule expressions for the recurring incremental sync
//! - Event bus system
//!
//! ## Overview
//!
//! Other workspace crates depend on this one for shared settings, the
//! logging conventions, and the broadcast channel used to surface sync
//! progress to hosts.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod schedule;

pub use error::{Error, Result};
