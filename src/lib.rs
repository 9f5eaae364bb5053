//! uptrail - Uptime and latency monitor
//!
//! Probes HTTP endpoints and TCP ports on a schedule, keeps rolling uptime
//! statistics per target and a bounded probe history in SQLite:
//! - `probe`: single reachability attempts (HTTP GET, TCP connect)
//! - `scheduler`: the per-tick fan-out, aggregation and stats updates
//! - `db`: SQLite storage for targets, settings and history

pub mod config;
pub mod db;
pub mod probe;
pub mod scheduler;

pub use config::{ScheduleInterval, ServerConfig};
pub use db::{Store, Target, TargetStore};
pub use scheduler::{Dispatcher, TickReport, Trigger, TriggerHandle};
