//! Workspace facade crate.
//!
//! Host applications depend on `reelsync-workspace` and get the bootstrap
//! façade from `core-service` without wiring each workspace crate by hand.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
