//! Shared database repository tests
//!
//! Each repository test module contains shared test functions that take
//! `&dyn XxxRepo`, run against in-memory SQLite with every `cargo test` and
//! against PostgreSQL via testcontainers (marked `#[ignore]`).
//!
//! ```bash
//! cargo test                       # Run fast SQLite tests only
//! cargo test -- --ignored          # Run PostgreSQL integration tests (requires Docker)
//! cargo test -- --include-ignored  # Run all tests
//! ```

pub mod harness;
mod usage;
