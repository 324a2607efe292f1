//! # Host Bridge Traits
//!
//! Capability contracts the sync core requires from its host process.
//!
//! ## Overview
//!
//! The sync engine never talks to a timer wheel or the wall clock directly.
//! Both are injected through the traits below so hosts can pick their own
//! runtime integration and tests can drive time deterministically.
//!
//! ## Traits
//!
//! - [`BackgroundExecutor`](background::BackgroundExecutor) - Recurring task scheduling
//! - [`TaskSchedule`](background::TaskSchedule) - Next-fire-time source for recurring tasks
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert runtime-specific failures into it with an actionable message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so handles can be shared across
//! async tasks behind `Arc`.

pub mod background;
pub mod error;
pub mod time;

pub use error::BridgeError;

pub use background::{
    task_handler, BackgroundExecutor, TaskHandler, TaskId, TaskSchedule, TaskStatus,
};
pub use time::{Clock, ManualClock, SystemClock};
