use serde_json::{json, Value};

use crate::handlers::migrate::MigrationFailure;
use crate::runtime::contract::{
    parse_event, CustomResourceEvent, CustomResourceResponse, RequestType, ResponseStatus,
    MIGRATION_HASH_PROPERTY,
};

/// Applies whatever migrations are still pending for the configured
/// database. Invoked for Create and Update events only.
pub trait SchemaMigrator {
    fn apply_pending(&self) -> Result<usize, MigrationFailure>;
}

/// Dispatches one lifecycle event and shapes the outcome into the
/// control-plane response contract.
///
/// Delete events resolve to success without touching the migrator (schema
/// teardown is not this component's responsibility). Create and Update
/// events run the migrator and report the executed script count. Every
/// invocation resolves to exactly one terminal response.
///
/// `physical_resource_id` must be stable across invocations for the same
/// logical resource; the entrypoint derives it from the execution
/// context's log-group name.
pub fn handle_lifecycle_event(
    event: Value,
    physical_resource_id: &str,
    migrator: &dyn SchemaMigrator,
) -> CustomResourceResponse {
    let parsed = match parse_event(&event) {
        Ok(value) => value,
        Err(error) => {
            log_lifecycle_error("event_rejected", json!({"error": error.message()}));
            return rejection_response(&event, physical_resource_id, error.message());
        }
    };

    log_lifecycle_info(
        "event_received",
        json!({
            "request_type": parsed.request_type.as_str(),
            "stack_id": parsed.stack_id.clone(),
            "request_id": parsed.request_id.clone(),
            "logical_resource_id": parsed.logical_resource_id.clone(),
            "migration_directory_hash": parsed
                .resource_properties
                .get(MIGRATION_HASH_PROPERTY)
                .cloned()
                .unwrap_or(Value::Null),
        }),
    );

    if parsed.request_type == RequestType::Delete {
        log_lifecycle_info("delete_acknowledged", json!({"request_id": parsed.request_id.clone()}));
        return terminal_response(
            &parsed,
            physical_resource_id,
            ResponseStatus::Success,
            None,
            json!({"Result": "None"}),
        );
    }

    match migrator.apply_pending() {
        Ok(executed) => {
            log_lifecycle_info(
                "migrations_succeeded",
                json!({
                    "request_id": parsed.request_id.clone(),
                    "executed": executed,
                }),
            );
            terminal_response(
                &parsed,
                physical_resource_id,
                ResponseStatus::Success,
                None,
                json!({"Result": executed}),
            )
        }
        Err(failure) => {
            let reason = failure.to_string();
            log_lifecycle_error(
                "migrations_failed",
                json!({
                    "request_id": parsed.request_id.clone(),
                    "error": reason.clone(),
                }),
            );
            terminal_response(
                &parsed,
                physical_resource_id,
                ResponseStatus::Failed,
                Some(reason.clone()),
                json!({"Result": reason}),
            )
        }
    }
}

fn terminal_response(
    event: &CustomResourceEvent,
    physical_resource_id: &str,
    status: ResponseStatus,
    reason: Option<String>,
    data: Value,
) -> CustomResourceResponse {
    CustomResourceResponse {
        stack_id: event.stack_id.clone(),
        request_id: event.request_id.clone(),
        logical_resource_id: event.logical_resource_id.clone(),
        physical_resource_id: physical_resource_id.to_string(),
        status,
        reason,
        data,
    }
}

/// Failure response for an event that never parsed. Echoes whatever
/// correlation fields are recoverable so the control plane can still match
/// the response to its request.
fn rejection_response(
    event: &Value,
    physical_resource_id: &str,
    reason: &str,
) -> CustomResourceResponse {
    let field = |key: &str| {
        event
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    CustomResourceResponse {
        stack_id: field("StackId"),
        request_id: field("RequestId"),
        logical_resource_id: field("LogicalResourceId"),
        physical_resource_id: physical_resource_id.to_string(),
        status: ResponseStatus::Failed,
        reason: Some(reason.to_string()),
        data: json!({"Result": reason}),
    }
}

fn log_lifecycle_info(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "lifecycle_adapter",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_lifecycle_error(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "lifecycle_adapter",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;
    use crate::adapters::ledger::{ApplyOutcome, MigrationLedger};
    use crate::handlers::migrate::apply_pending_scripts;
    use crate::runtime::scripts::{load_migration_dir, MigrationScript};

    struct CountingMigrator {
        calls: Mutex<usize>,
        outcome: Result<usize, MigrationFailure>,
    }

    impl CountingMigrator {
        fn succeeding_with(executed: usize) -> Self {
            Self {
                calls: Mutex::new(0),
                outcome: Ok(executed),
            }
        }

        fn failing_with(failure: MigrationFailure) -> Self {
            Self {
                calls: Mutex::new(0),
                outcome: Err(failure),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().expect("poisoned mutex")
        }
    }

    impl SchemaMigrator for CountingMigrator {
        fn apply_pending(&self) -> Result<usize, MigrationFailure> {
            *self.calls.lock().expect("poisoned mutex") += 1;
            self.outcome.clone()
        }
    }

    fn update_event() -> Value {
        json!({
            "RequestType": "Update",
            "StackId": "arn:aws:cloudformation:eu-west-1:123:stack/articles/abc",
            "RequestId": "req-1",
            "LogicalResourceId": "DbSchemaMigration",
            "ResourceProperties": {
                MIGRATION_HASH_PROPERTY: "cafe"
            }
        })
    }

    #[test]
    fn delete_resolves_success_without_invoking_the_migrator() {
        let migrator = CountingMigrator::succeeding_with(0);
        let mut event = update_event();
        event["RequestType"] = json!("Delete");

        let response = handle_lifecycle_event(event, "log-group", &migrator);

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.data, json!({"Result": "None"}));
        assert_eq!(migrator.calls(), 0);
    }

    #[test]
    fn update_success_reports_executed_script_count() {
        let migrator = CountingMigrator::succeeding_with(2);

        let response = handle_lifecycle_event(update_event(), "log-group", &migrator);

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.data, json!({"Result": 2}));
        assert!(response.reason.is_none());
        assert_eq!(migrator.calls(), 1);
    }

    #[test]
    fn create_dispatches_to_the_migrator() {
        let migrator = CountingMigrator::succeeding_with(3);
        let mut event = update_event();
        event["RequestType"] = json!("Create");

        let response = handle_lifecycle_event(event, "log-group", &migrator);

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(migrator.calls(), 1);
    }

    #[test]
    fn migration_failure_carries_reason_and_raw_detail() {
        let migrator = CountingMigrator::failing_with(MigrationFailure::Script {
            name: "002_add_col.sql".to_string(),
            detail: "syntax error at or near \"COLUM\"".to_string(),
        });

        let response = handle_lifecycle_event(update_event(), "log-group", &migrator);

        assert_eq!(response.status, ResponseStatus::Failed);
        let reason = response.reason.expect("failed response should carry a reason");
        assert!(reason.contains("002_add_col.sql"));
        assert!(reason.contains("syntax error"));
        assert_eq!(response.data, json!({"Result": reason}));
    }

    #[test]
    fn responses_echo_event_correlation_fields() {
        let migrator = CountingMigrator::succeeding_with(0);

        let response = handle_lifecycle_event(update_event(), "log-group", &migrator);

        assert_eq!(
            response.stack_id,
            "arn:aws:cloudformation:eu-west-1:123:stack/articles/abc"
        );
        assert_eq!(response.request_id, "req-1");
        assert_eq!(response.logical_resource_id, "DbSchemaMigration");
    }

    #[test]
    fn physical_resource_id_is_identical_across_invocations() {
        let migrator = CountingMigrator::succeeding_with(1);

        let first = handle_lifecycle_event(update_event(), "/aws/lambda/articles", &migrator);
        let second = handle_lifecycle_event(update_event(), "/aws/lambda/articles", &migrator);

        assert_eq!(first.physical_resource_id, second.physical_resource_id);
        assert_eq!(first.physical_resource_id, "/aws/lambda/articles");
    }

    #[test]
    fn unrecognized_request_type_fails_without_dispatching() {
        let migrator = CountingMigrator::succeeding_with(0);
        let mut event = update_event();
        event["RequestType"] = json!("Bounce");

        let response = handle_lifecycle_event(event, "log-group", &migrator);

        assert_eq!(response.status, ResponseStatus::Failed);
        assert!(response
            .reason
            .expect("failed response should carry a reason")
            .contains("unknown variant"));
        assert_eq!(response.request_id, "req-1");
        assert_eq!(migrator.calls(), 0);
    }

    #[test]
    fn malformed_event_fails_with_empty_correlation_fields() {
        let migrator = CountingMigrator::succeeding_with(0);

        let response = handle_lifecycle_event(json!([1, 2, 3]), "log-group", &migrator);

        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.stack_id, "");
        assert_eq!(migrator.calls(), 0);
    }

    /// Loads scripts from a directory and applies them against an
    /// in-memory ledger, mirroring the production migrator's composition.
    struct DirectoryMigrator {
        dir: PathBuf,
        ledger: InMemoryLedger,
    }

    #[derive(Default)]
    struct InMemoryLedger {
        applied: Mutex<Vec<String>>,
    }

    impl MigrationLedger for InMemoryLedger {
        fn ensure_ledger(&self) -> Result<(), String> {
            Ok(())
        }

        fn applied_identities(&self) -> Result<std::collections::HashSet<String>, String> {
            Ok(self
                .applied
                .lock()
                .expect("poisoned mutex")
                .iter()
                .cloned()
                .collect())
        }

        fn apply_and_record(&self, script: &MigrationScript) -> Result<ApplyOutcome, String> {
            self.applied
                .lock()
                .expect("poisoned mutex")
                .push(script.name.clone());
            Ok(ApplyOutcome::Applied)
        }
    }

    impl SchemaMigrator for DirectoryMigrator {
        fn apply_pending(&self) -> Result<usize, MigrationFailure> {
            let migration_set = load_migration_dir(&self.dir)
                .map_err(|error| MigrationFailure::Configuration(error.to_string()))?;
            apply_pending_scripts(&migration_set, &self.ledger)
        }
    }

    #[test]
    fn repeated_update_events_run_the_set_once_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(dir.path().join("001_init.sql"), "CREATE TABLE t (id INT);")
            .expect("script should be written");
        std::fs::write(
            dir.path().join("002_add_col.sql"),
            "ALTER TABLE t ADD COLUMN c TEXT;",
        )
        .expect("script should be written");

        let migrator = DirectoryMigrator {
            dir: dir.path().to_path_buf(),
            ledger: InMemoryLedger::default(),
        };

        let first = handle_lifecycle_event(update_event(), "log-group", &migrator);
        let second = handle_lifecycle_event(update_event(), "log-group", &migrator);

        assert_eq!(first.status, ResponseStatus::Success);
        assert_eq!(first.data, json!({"Result": 2}));
        assert_eq!(second.status, ResponseStatus::Success);
        assert_eq!(second.data, json!({"Result": 0}));
    }

    #[test]
    fn missing_migration_directory_fails_as_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let migrator = DirectoryMigrator {
            dir: dir.path().join("absent"),
            ledger: InMemoryLedger::default(),
        };

        let response = handle_lifecycle_event(update_event(), "log-group", &migrator);

        assert_eq!(response.status, ResponseStatus::Failed);
        assert!(response
            .reason
            .expect("failed response should carry a reason")
            .contains("configuration error"));
    }
}
