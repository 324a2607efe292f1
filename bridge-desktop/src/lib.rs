//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for long-running server and
//! desktop processes.
//!
//! ## Overview
//!
//! - `BackgroundExecutor` using Tokio tasks and timers
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::TokioBackgroundExecutor;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let executor = Arc::new(TokioBackgroundExecutor::new());
//!     // Hand it to `CoreConfig::builder().background_executor(executor)`
//! }
//! ```

mod background;

pub use background::TokioBackgroundExecutor;
