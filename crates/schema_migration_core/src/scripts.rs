use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// One migration script. Identity is the filename; lexicographic filename
/// order defines execution order. Content is immutable once fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub name: String,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSourceError {
    message: String,
}

impl ScriptSourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ScriptSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ScriptSourceError {}

/// Loads the migration set from a directory, sorted by filename.
///
/// Only regular `.sql` files belong to the set; subdirectories and other
/// entries are ignored. A missing or unreadable directory, an unreadable
/// script, or a non-UTF-8 script name is a fatal configuration error.
pub fn load_migration_dir(dir: &Path) -> Result<Vec<MigrationScript>, ScriptSourceError> {
    let entries = fs::read_dir(dir).map_err(|error| {
        ScriptSourceError::new(format!(
            "Cannot read migration directory {}: {error}",
            dir.display()
        ))
    })?;

    let mut migration_set = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error| {
            ScriptSourceError::new(format!(
                "Cannot read migration directory {}: {error}",
                dir.display()
            ))
        })?;

        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
            continue;
        }

        let name = entry.file_name().into_string().map_err(|name| {
            ScriptSourceError::new(format!(
                "Migration script name {:?} is not valid UTF-8",
                name
            ))
        })?;

        let sql = fs::read_to_string(&path).map_err(|error| {
            ScriptSourceError::new(format!(
                "Cannot read migration script {}: {error}",
                path.display()
            ))
        })?;

        migration_set.push(MigrationScript { name, sql });
    }

    migration_set.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(migration_set)
}

/// Returns the scripts whose identity is not yet recorded in the ledger,
/// preserving the migration set's order.
pub fn pending_scripts<'a>(
    migration_set: &'a [MigrationScript],
    applied: &HashSet<String>,
) -> Vec<&'a MigrationScript> {
    migration_set
        .iter()
        .filter(|script| !applied.contains(&script.name))
        .collect()
}
