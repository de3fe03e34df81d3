use serde_json::json;

use crate::adapters::ledger::{ApplyOutcome, MigrationLedger};
use crate::runtime::scripts::{pending_scripts, MigrationScript};

/// Why a migration run could not complete. Only the lifecycle adapter
/// translates these into the control-plane response shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationFailure {
    /// Missing or unreadable migration source, or invalid invocation
    /// configuration. Surfaced before any network call where possible.
    Configuration(String),
    /// Secret store or database unreachable. Retry policy belongs to the
    /// control plane, not to this component.
    Connectivity(String),
    /// The ledger table could not be created or read.
    Ledger(String),
    /// A script failed to apply. Prior scripts of the same run stay
    /// committed; nothing after this script was attempted.
    Script { name: String, detail: String },
}

impl std::fmt::Display for MigrationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(detail) => write!(f, "configuration error: {detail}"),
            Self::Connectivity(detail) => write!(f, "connectivity error: {detail}"),
            Self::Ledger(detail) => write!(f, "migration ledger error: {detail}"),
            Self::Script { name, detail } => write!(f, "migration {name} failed: {detail}"),
        }
    }
}

impl std::error::Error for MigrationFailure {}

/// Applies every script not yet recorded in the ledger, in ascending
/// identity order, and returns how many scripts this invocation executed.
///
/// Each script runs inside the ledger's atomic apply-and-record unit, so a
/// crash mid-run never leaves the ledger out of step with the schema. A
/// re-run with an unchanged set is a no-op returning 0. A script observed
/// as applied by a concurrent run is skipped without error and without
/// counting.
pub fn apply_pending_scripts(
    migration_set: &[MigrationScript],
    ledger: &dyn MigrationLedger,
) -> Result<usize, MigrationFailure> {
    ledger.ensure_ledger().map_err(MigrationFailure::Ledger)?;
    let applied = ledger
        .applied_identities()
        .map_err(MigrationFailure::Ledger)?;

    let mut pending = pending_scripts(migration_set, &applied);
    pending.sort_by(|left, right| left.name.cmp(&right.name));

    log_migration_info(
        "run_started",
        json!({
            "total_scripts": migration_set.len(),
            "pending_scripts": pending.len(),
        }),
    );

    let mut executed = 0usize;
    for script in pending {
        let outcome = match ledger.apply_and_record(script) {
            Ok(outcome) => outcome,
            Err(detail) => {
                log_migration_error(
                    "script_failed",
                    json!({
                        "script": script.name.clone(),
                        "error": detail.clone(),
                    }),
                );
                return Err(MigrationFailure::Script {
                    name: script.name.clone(),
                    detail,
                });
            }
        };

        match outcome {
            ApplyOutcome::Applied => {
                log_migration_info("script_applied", json!({"script": script.name.clone()}));
                executed += 1;
            }
            ApplyOutcome::AlreadyApplied => {
                log_migration_info(
                    "script_already_applied",
                    json!({"script": script.name.clone()}),
                );
            }
        }
    }

    log_migration_info("run_completed", json!({"executed": executed}));
    Ok(executed)
}

fn log_migration_info(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "migration_runner",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_migration_error(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "migration_runner",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
