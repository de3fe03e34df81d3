use std::path::Path;

use sha2::{Digest, Sha256};

use crate::scripts::{self, MigrationScript, ScriptSourceError};

/// Computes the content fingerprint of a set of named entries.
///
/// Each entry's bytes are hashed independently, the hex digests are joined
/// in lexicographic name order, and the joined string is hashed again. Any
/// change to any entry's content, or to the set of names, changes the
/// result; the order entries are supplied in does not.
pub fn fingerprint_entries(entries: &[(impl AsRef<str>, impl AsRef<[u8]>)]) -> String {
    let mut digests: Vec<(&str, String)> = entries
        .iter()
        .map(|(name, bytes)| {
            let mut hasher = Sha256::new();
            hasher.update(bytes.as_ref());
            (name.as_ref(), format!("{:x}", hasher.finalize()))
        })
        .collect();
    digests.sort_by(|left, right| left.0.cmp(right.0));

    let joined = digests
        .iter()
        .map(|(_, digest)| digest.as_str())
        .collect::<Vec<_>>()
        .join(",");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn fingerprint_scripts(migration_set: &[MigrationScript]) -> String {
    let entries: Vec<(&str, &[u8])> = migration_set
        .iter()
        .map(|script| (script.name.as_str(), script.sql.as_bytes()))
        .collect();
    fingerprint_entries(&entries)
}

/// Fingerprints the migration set found in `dir`. Reading failures are
/// configuration errors and propagate unchanged.
pub fn fingerprint_directory(dir: &Path) -> Result<String, ScriptSourceError> {
    let migration_set = scripts::load_migration_dir(dir)?;
    Ok(fingerprint_scripts(&migration_set))
}
