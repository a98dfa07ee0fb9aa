//! mcp-stress driver: the execution engine, recording path, dashboard
//! and CLI glue on top of the transport and stats crates.

pub mod aggregator;
pub mod cli;
pub mod dashboard;
pub mod engine;
pub mod history;
pub mod ndjson;
pub mod recorder;
pub mod report;
pub mod rng;
pub mod sampler;
