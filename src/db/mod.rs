//! Database module for uptrail.
//!
//! Provides SQLite storage for targets, settings and probe history.

mod models;
mod store;

pub use models::*;
pub use store::*;
