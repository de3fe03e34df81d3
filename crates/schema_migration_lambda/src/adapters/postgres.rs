use std::collections::HashSet;
use std::path::PathBuf;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::adapters::credentials::{
    compose_database_url, ConnectionSettings, CredentialsProvider,
};
use crate::adapters::ledger::{ApplyOutcome, MigrationLedger};
use crate::handlers::lifecycle::SchemaMigrator;
use crate::handlers::migrate::{apply_pending_scripts, MigrationFailure};
use crate::runtime::scripts::{load_migration_dir, MigrationScript};

/// Everything the production migrator needs besides credentials. Built once
/// per invocation from the deployment environment, before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratorSettings {
    pub migrations_dir: PathBuf,
    pub ledger_table: String,
    pub connection: ConnectionSettings,
}

/// Migration ledger backed by the target Postgres database.
///
/// The ledger table's primary key on the migration identity is the only
/// concurrency guard: the losing side of a duplicate insert rolls back its
/// whole transaction, script effects included.
pub struct PgMigrationLedger {
    pool: PgPool,
    ledger_table: String,
}

impl PgMigrationLedger {
    /// Connects to the target database. Connection failures are reported,
    /// not retried; retry policy belongs to the control plane.
    pub fn connect(database_url: &str, ledger_table: impl Into<String>) -> Result<Self, String> {
        let url = database_url.to_string();
        let pool = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                PgPoolOptions::new()
                    .max_connections(1)
                    .connect(&url)
                    .await
                    .map_err(|error| format!("failed to connect to database: {error}"))
            })
        })?;

        Ok(Self {
            pool,
            ledger_table: ledger_table.into(),
        })
    }
}

impl MigrationLedger for PgMigrationLedger {
    fn ensure_ledger(&self) -> Result<(), String> {
        let pool = self.pool.clone();
        let ddl = format!(
            r#"CREATE TABLE IF NOT EXISTS "{}" (
                name TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
            self.ledger_table
        );

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                sqlx::query(&ddl)
                    .execute(&pool)
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to create migration ledger table: {error}"))
            })
        })
    }

    fn applied_identities(&self) -> Result<HashSet<String>, String> {
        let pool = self.pool.clone();
        let select = format!(r#"SELECT name FROM "{}""#, self.ledger_table);

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let names: Vec<String> = sqlx::query_scalar(&select)
                    .fetch_all(&pool)
                    .await
                    .map_err(|error| format!("failed to read migration ledger: {error}"))?;
                Ok(names.into_iter().collect())
            })
        })
    }

    fn apply_and_record(&self, script: &MigrationScript) -> Result<ApplyOutcome, String> {
        let pool = self.pool.clone();
        let insert = format!(
            r#"INSERT INTO "{}" (name) VALUES ($1)"#,
            self.ledger_table
        );
        let name = script.name.clone();
        let sql = script.sql.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|error| format!("failed to open transaction: {error}"))?;

                sqlx::raw_sql(&sql)
                    .execute(&mut *tx)
                    .await
                    .map_err(|error| error.to_string())?;

                if let Err(error) = sqlx::query(&insert).bind(&name).execute(&mut *tx).await {
                    let lost_race = error
                        .as_database_error()
                        .is_some_and(|db| db.is_unique_violation());
                    if lost_race {
                        tx.rollback().await.map_err(|rollback| {
                            format!("failed to roll back duplicate application: {rollback}")
                        })?;
                        return Ok(ApplyOutcome::AlreadyApplied);
                    }
                    return Err(format!("failed to record ledger entry: {error}"));
                }

                tx.commit()
                    .await
                    .map_err(|error| format!("failed to commit: {error}"))?;
                Ok(ApplyOutcome::Applied)
            })
        })
    }
}

/// Production [`SchemaMigrator`]: resolves credentials, connects, loads the
/// bundled migration set, and applies whatever the ledger says is pending.
pub struct PostgresMigrator<'a> {
    pub settings: MigratorSettings,
    pub credentials: &'a dyn CredentialsProvider,
}

impl SchemaMigrator for PostgresMigrator<'_> {
    fn apply_pending(&self) -> Result<usize, MigrationFailure> {
        let migration_set = load_migration_dir(&self.settings.migrations_dir)
            .map_err(|error| MigrationFailure::Configuration(error.to_string()))?;

        let credentials = self
            .credentials
            .fetch_credentials()
            .map_err(MigrationFailure::Connectivity)?;
        let database_url = compose_database_url(&credentials, &self.settings.connection);

        let ledger = PgMigrationLedger::connect(&database_url, self.settings.ledger_table.clone())
            .map_err(MigrationFailure::Connectivity)?;

        apply_pending_scripts(&migration_set, &ledger)
    }
}
