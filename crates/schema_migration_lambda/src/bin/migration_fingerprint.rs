//! Prints the content fingerprint of a migration directory.
//!
//! Deploy tooling embeds the value as the `migrationDirectoryHash` resource
//! property, so the control plane only re-invokes the migration handler
//! when script contents actually change.

use std::path::PathBuf;
use std::process::exit;

use serde_json::json;

use schema_migration_lambda::runtime::contract::MIGRATION_HASH_PROPERTY;
use schema_migration_lambda::runtime::fingerprint::fingerprint_directory;

fn main() {
    let Some(dir) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: migration_fingerprint <migrations-dir>");
        exit(2);
    };

    match fingerprint_directory(&dir) {
        Ok(fingerprint) => {
            println!("{}", json!({ MIGRATION_HASH_PROPERTY: fingerprint }));
        }
        Err(error) => {
            eprintln!("{error}");
            exit(1);
        }
    }
}
