use std::collections::HashSet;

use crate::runtime::scripts::MigrationScript;

/// Default name of the ledger table recording applied migrations.
pub const DEFAULT_LEDGER_TABLE: &str = "migration-table";

/// Outcome of one atomic apply-and-record unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The script executed and its ledger row committed together.
    Applied,
    /// A concurrent run recorded this script first; every effect of this
    /// attempt was rolled back.
    AlreadyApplied,
}

/// Durable record of which migrations have run against a database. The
/// ledger, not the fingerprint, is authoritative for what still needs to
/// execute.
pub trait MigrationLedger {
    /// Creates the ledger table if it does not exist. Idempotent.
    fn ensure_ledger(&self) -> Result<(), String>;

    /// Identities of every migration recorded as applied.
    fn applied_identities(&self) -> Result<HashSet<String>, String>;

    /// Executes the script and inserts its ledger row in a single
    /// transaction. A duplicate ledger identity must roll the whole unit
    /// back and report [`ApplyOutcome::AlreadyApplied`] instead of failing.
    fn apply_and_record(&self, script: &MigrationScript) -> Result<ApplyOutcome, String>;
}
