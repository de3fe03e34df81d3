//! AWS-oriented adapters and handlers for database schema migration.
//!
//! This crate owns runtime integration details (the Lambda lifecycle
//! handler, credentials lookup, and the Postgres migration ledger) and
//! exposes a single runtime module boundary for contract, fingerprint, and
//! script primitives.

pub mod adapters;
pub mod handlers;
pub mod runtime;
