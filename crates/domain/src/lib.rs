//! Shared domain types for mcp-stress.
//!
//! This crate holds everything the other crates agree on: the error
//! taxonomy, the NDJSON event model, workload profiles, and load shapes.
//! It has no I/O of its own.

pub mod category;
pub mod error;
pub mod events;
pub mod shapes;
pub mod workload;

pub use category::ErrorCategory;
pub use error::{Error, Result};
