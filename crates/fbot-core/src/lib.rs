//! # fbot-core
//!
//! Core crate for the fbot futures execution engine, providing:
//!
//! - **Types** (`types`): enums, symbol rules and rounding, order requests and
//!   outcomes, strategy runs
//! - **Configuration** (`config`): JSON config deserialization and validation
//! - **Error types** (`error`): validation / precision / exchange taxonomy via thiserror
//! - **Time utilities** (`time_util`): millisecond timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
