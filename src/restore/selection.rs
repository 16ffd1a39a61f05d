// dbimporter/src/restore/selection.rs
use crate::errors::{ImportError, Result};
use crate::restore::s3_download::{BackupObject, RemoteStore};

/// Lists the candidate backups under `prefix`.
///
/// An empty listing is an error: there is nothing to restore.
pub async fn list_backups(store: &dyn RemoteStore, prefix: &str) -> Result<Vec<BackupObject>> {
    let candidates = store
        .list(prefix)
        .await
        .map_err(|e| ImportError::Remote(format!("{:#}", e)))?;

    if candidates.is_empty() {
        return Err(ImportError::NoBackupsFound {
            prefix: prefix.to_string(),
        });
    }

    tracing::info!("Found {} backup(s) under prefix '{}'", candidates.len(), prefix);
    Ok(candidates)
}

/// Index of the most recent candidate. The earliest entry wins a tie.
pub fn select_latest_index(candidates: &[BackupObject]) -> Result<usize> {
    let mut best: Option<usize> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        match best {
            Some(b) if candidates[b].last_modified >= candidate.last_modified => {}
            _ => best = Some(idx),
        }
    }
    best.ok_or(ImportError::EmptyInput)
}

pub fn select_latest(candidates: &[BackupObject]) -> Result<&BackupObject> {
    select_latest_index(candidates).map(|idx| &candidates[idx])
}
