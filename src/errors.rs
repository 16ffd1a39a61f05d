use std::path::PathBuf;

use thiserror::Error;

use crate::restore::ImportStage;

/// Fatal errors raised by a pipeline stage.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("No backups found under prefix '{prefix}'. Did you set the correct folder_prefix in config.json?")]
    NoBackupsFound { prefix: String },

    #[error("Cannot select a backup from an empty candidate list")]
    EmptyInput,

    #[error("Unsupported archive format '{content_type}' for {key}. Only application/x-gzip and application/zip are allowed")]
    UnsupportedArchiveFormat { key: String, content_type: String },

    #[error("Corrupt archive {}: {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("SQL payload not found at {}: {reason}", path.display())]
    PayloadNotFound { path: PathBuf, reason: String },

    #[error("Restore failed while executing {}: {source}", path.display())]
    RestoreFailed {
        path: PathBuf,
        #[source]
        source: DatabaseError,
    },

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Scratch storage error at {}: {source}", path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error returned by a [`crate::restore::Database`] implementation.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

/// Non-fatal problem removing a scratch artifact.
#[derive(Error, Debug)]
#[error("Failed to remove scratch path {}: {source}", path.display())]
pub struct CleanupWarning {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Terminal failure of one pipeline run.
///
/// Carries the stage that failed and any warnings produced while the scratch
/// workspace was being removed afterwards.
#[derive(Error, Debug)]
#[error("Import failed while {stage}: {error}")]
pub struct ImportFailure {
    pub stage: ImportStage,
    #[source]
    pub error: ImportError,
    pub warnings: Vec<CleanupWarning>,
}

pub type Result<T> = std::result::Result<T, ImportError>;
