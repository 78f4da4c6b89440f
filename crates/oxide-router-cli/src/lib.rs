//! Route table tooling for `oxide-router`.
//!
//! Backs the `oxide-route` binary:
//!
//! - **Tables** - JSON route tables with router options ([`table`])
//! - **Reports** - per-path match reports and throughput runs ([`report`])
//! - **Warm state** - cache and param-order snapshots on disk ([`state`])

pub mod error;
pub mod report;
pub mod state;
pub mod table;

pub use error::{CliError, Result};
pub use report::{bench, static_paths, BenchReport, MatchLine};
pub use state::WarmState;
pub use table::{MethodSpec, RouteEntry, RouteTable};
