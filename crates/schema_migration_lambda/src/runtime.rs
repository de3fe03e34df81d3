//! Runtime module boundary over the deterministic core crate.

pub use schema_migration_core::{contract, fingerprint, scripts};
