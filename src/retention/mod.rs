//! Data retention for the reporting tables.
//!
//! A background worker periodically deletes daily ledger rows and request
//! log entries older than their configured retention period. Deletions are
//! batched and support a dry-run mode. The counter store expires its own
//! keys and is never touched here.

mod worker;

pub use worker::{RetentionRunResult, run_retention, run_retention_at, start_retention_worker};
