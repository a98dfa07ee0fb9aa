//! Statistics for mcp-stress: percentiles, chart windowing, assertion
//! parsing/evaluation, and cross-run aggregation.

pub mod aggregate;
pub mod assert;
pub mod percentile;
pub mod window;

pub use aggregate::aggregate_summaries;
pub use assert::{Assertion, AssertionResult};
pub use percentile::{latency_stats, percentile};
pub use window::{build_chart, PreparedChart, WindowStat};
