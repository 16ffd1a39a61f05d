// dbimporter/src/restore/db_restore.rs
use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::errors::{DatabaseError, ImportError, Result};
use crate::utils::redact_db_url;

/// Target database of an import.
#[async_trait]
pub trait Database: Send + Sync {
    /// Executes `sql` as one raw batch, without splitting it into statements.
    async fn execute_raw(&self, sql: &str) -> std::result::Result<(), DatabaseError>;
}

/// PostgreSQL target reached through a single-connection sqlx pool.
pub struct PgDatabase {
    pool: PgPool,
    single_transaction: bool,
}

impl PgDatabase {
    /// Connects to `target_db_url`, failing early if the server is unreachable.
    pub async fn connect(target_db_url: &str, single_transaction: bool) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(target_db_url)
            .await
            .with_context(|| {
                format!("Failed to connect to target database {}", redact_db_url(target_db_url))
            })?;

        tracing::info!("✅ Connected to {}", redact_db_url(target_db_url));
        Ok(PgDatabase {
            pool,
            single_transaction,
        })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn execute_raw(&self, sql: &str) -> std::result::Result<(), DatabaseError> {
        if sql.trim().is_empty() {
            return Err(DatabaseError::Other("SQL payload is empty".to_string()));
        }
        // A bare &str without bind arguments goes through the simple query
        // protocol, which accepts multiple statements.
        if self.single_transaction {
            let mut tx = self.pool.begin().await?;
            (&mut *tx).execute(sql).await?;
            tx.commit().await?;
        } else {
            self.pool.execute(sql).await?;
        }
        Ok(())
    }
}

/// SQL payload that was executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredPayload {
    pub path: PathBuf,
    pub bytes: usize,
}

/// Locates the SQL file inside the extraction destination.
///
/// Without a sub-path the destination itself must be the SQL file (gzip
/// backups). With one, the file is looked up relative to the destination
/// (zip backups holding several files).
pub fn resolve_payload(destination: &Path, subpath: Option<&str>) -> Result<PathBuf> {
    let path = match subpath {
        None => destination.to_path_buf(),
        Some(subpath) => {
            let relative = Path::new(subpath.trim_start_matches('/'));
            if relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
            {
                return Err(ImportError::PayloadNotFound {
                    path: destination.join(relative),
                    reason: format!("sub-path '{}' leaves the extracted archive", subpath),
                });
            }
            destination.join(relative)
        }
    };

    match fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Ok(path),
        Ok(_) => Err(ImportError::PayloadNotFound {
            reason: match subpath {
                None => "extracted backup is a directory; set import_options.zip_full_path to the SQL file inside it".to_string(),
                Some(_) => "path is a directory, not a SQL file".to_string(),
            },
            path,
        }),
        Err(e) => Err(ImportError::PayloadNotFound {
            path,
            reason: e.to_string(),
        }),
    }
}

/// Reads the payload and runs it against `database`.
///
/// This replaces whatever the SQL dump touches in the target database.
pub async fn restore_payload(
    database: &dyn Database,
    destination: &Path,
    subpath: Option<&str>,
) -> Result<RestoredPayload> {
    let path = resolve_payload(destination, subpath)?;

    // A payload that is not text counts as unreadable; no SQL was found.
    let sql = fs::read_to_string(&path).map_err(|e| ImportError::PayloadNotFound {
        path: path.clone(),
        reason: match e.kind() {
            ErrorKind::InvalidData => "file exists but is not valid UTF-8 text, so it holds no SQL".to_string(),
            _ => e.to_string(),
        },
    })?;

    tracing::info!("Executing {} bytes of SQL from {}", sql.len(), path.display());

    database
        .execute_raw(&sql)
        .await
        .map_err(|source| ImportError::RestoreFailed {
            path: path.clone(),
            source,
        })?;

    tracing::info!("✓ Successfully executed SQL file {}", path.display());
    Ok(RestoredPayload {
        path,
        bytes: sql.len(),
    })
}
