use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use schema_migration_lambda::adapters::credentials::{
    ConnectionSettings, CredentialsProvider, DbCredentials,
};
use schema_migration_lambda::adapters::ledger::DEFAULT_LEDGER_TABLE;
use schema_migration_lambda::adapters::postgres::{MigratorSettings, PostgresMigrator};
use schema_migration_lambda::handlers::lifecycle::{handle_lifecycle_event, SchemaMigrator};
use schema_migration_lambda::handlers::migrate::MigrationFailure;
use schema_migration_lambda::runtime::contract::CustomResourceResponse;

struct SecretsManagerCredentials {
    secrets_client: aws_sdk_secretsmanager::Client,
    secret_name: String,
}

impl CredentialsProvider for SecretsManagerCredentials {
    fn fetch_credentials(&self) -> Result<DbCredentials, String> {
        let client = self.secrets_client.clone();
        let secret_name = self.secret_name.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let secret = client
                    .get_secret_value()
                    .secret_id(secret_name)
                    .send()
                    .await
                    .map_err(|error| {
                        format!("failed to read database credentials secret: {error}")
                    })?;

                let payload = secret
                    .secret_string()
                    .ok_or_else(|| "database credentials secret has no string payload".to_string())?;

                serde_json::from_str::<DbCredentials>(payload).map_err(|error| {
                    format!("database credentials secret is not valid JSON: {error}")
                })
            })
        })
    }
}

/// Stand-in migrator for a broken deployment environment. Delete events
/// still resolve to success because the lifecycle adapter never invokes it;
/// Create and Update surface the configuration error.
struct MisconfiguredMigrator {
    detail: String,
}

impl SchemaMigrator for MisconfiguredMigrator {
    fn apply_pending(&self) -> Result<usize, MigrationFailure> {
        Err(MigrationFailure::Configuration(self.detail.clone()))
    }
}

struct RuntimeSettings {
    migrator: MigratorSettings,
    secret_name: String,
}

fn load_runtime_settings() -> Result<RuntimeSettings, String> {
    let host = std::env::var("DB_CLUSTER_HOST_NAME")
        .map_err(|_| "DB_CLUSTER_HOST_NAME must be configured".to_string())?;
    let port = std::env::var("DB_CLUSTER_PORT")
        .map_err(|_| "DB_CLUSTER_PORT must be configured".to_string())?
        .parse::<u16>()
        .map_err(|_| "DB_CLUSTER_PORT must be a valid port number".to_string())?;
    let database =
        std::env::var("DB_NAME").map_err(|_| "DB_NAME must be configured".to_string())?;
    let secret_name = std::env::var("DB_CREDENTIALS_SECRET_NAME")
        .map_err(|_| "DB_CREDENTIALS_SECRET_NAME must be configured".to_string())?;

    Ok(RuntimeSettings {
        migrator: MigratorSettings {
            migrations_dir: std::env::var("MIGRATIONS_DIR")
                .unwrap_or_else(|_| "./migrations".to_string())
                .into(),
            ledger_table: std::env::var("MIGRATION_LEDGER_TABLE")
                .unwrap_or_else(|_| DEFAULT_LEDGER_TABLE.to_string()),
            connection: ConnectionSettings {
                host,
                port,
                database,
            },
        },
        secret_name,
    })
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<CustomResourceResponse, Error> {
    // Stable per logical resource: the log group follows the function, not
    // the invocation.
    let log_group = event.context.env_config.log_group.clone();
    let physical_resource_id = if log_group.is_empty() {
        event.context.invoked_function_arn.clone()
    } else {
        log_group
    };

    let response = match load_runtime_settings() {
        Ok(settings) => {
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            let credentials = SecretsManagerCredentials {
                secrets_client: aws_sdk_secretsmanager::Client::new(&aws_config),
                secret_name: settings.secret_name,
            };
            let migrator = PostgresMigrator {
                settings: settings.migrator,
                credentials: &credentials,
            };
            handle_lifecycle_event(event.payload, &physical_resource_id, &migrator)
        }
        Err(detail) => handle_lifecycle_event(
            event.payload,
            &physical_resource_id,
            &MisconfiguredMigrator { detail },
        ),
    };

    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
