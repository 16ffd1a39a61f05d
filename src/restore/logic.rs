// dbimporter/src/restore/logic.rs
use std::fmt;
use std::path::PathBuf;

use crate::config::ImportConfig;
use crate::errors::{CleanupWarning, ImportError, ImportFailure, Result};
use crate::restore::archive::{self, ArchiveFormat};
use crate::restore::db_restore::{self, Database};
use crate::restore::s3_download::{BackupObject, RemoteStore};
use crate::restore::selection;
use crate::restore::workspace::ScratchWorkspace;

/// States of one import run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Idle,
    Listing,
    Selecting,
    Downloading,
    Detecting,
    Extracting,
    Restoring,
    CleaningUp,
    Succeeded,
    Failed,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportStage::Idle => "idle",
            ImportStage::Listing => "listing backups",
            ImportStage::Selecting => "selecting the latest backup",
            ImportStage::Downloading => "downloading",
            ImportStage::Detecting => "detecting the archive format",
            ImportStage::Extracting => "extracting",
            ImportStage::Restoring => "restoring",
            ImportStage::CleaningUp => "cleaning up",
            ImportStage::Succeeded => "succeeded",
            ImportStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a successful import.
#[derive(Debug)]
pub struct ImportReport {
    pub key: String,
    pub last_modified: i64,
    pub format: ArchiveFormat,
    pub downloaded_bytes: usize,
    pub payload_path: PathBuf,
    pub payload_bytes: usize,
    pub warnings: Vec<CleanupWarning>,
}

struct DownloadedBackup {
    object: BackupObject,
    format: ArchiveFormat,
    bytes: Vec<u8>,
}

/// Restores the newest backup found in a remote store into a database.
///
/// Stages run strictly in sequence and nothing is retried. Once the scratch
/// workspace exists it is removed before the result is returned, whether the
/// restore succeeded or not.
pub struct ImportPipeline<'a> {
    store: &'a dyn RemoteStore,
    database: &'a dyn Database,
    config: &'a ImportConfig,
    stage: ImportStage,
    history: Vec<ImportStage>,
}

impl<'a> ImportPipeline<'a> {
    pub fn new(
        store: &'a dyn RemoteStore,
        database: &'a dyn Database,
        config: &'a ImportConfig,
    ) -> Self {
        ImportPipeline {
            store,
            database,
            config,
            stage: ImportStage::Idle,
            history: Vec::new(),
        }
    }

    pub fn stage(&self) -> ImportStage {
        self.stage
    }

    /// Every stage entered so far, in order.
    pub fn history(&self) -> &[ImportStage] {
        &self.history
    }

    pub async fn run(&mut self) -> std::result::Result<ImportReport, ImportFailure> {
        let backup = match self.fetch_latest().await {
            Ok(backup) => backup,
            Err(error) => {
                let stage = self.stage;
                return Err(self.fail(stage, error, Vec::new()));
            }
        };

        self.enter(ImportStage::Extracting);
        let mut workspace = match ScratchWorkspace::acquire(&self.config.scratch_dir) {
            Ok(workspace) => workspace,
            Err(error) => return Err(self.fail(ImportStage::Extracting, error, Vec::new())),
        };

        let outcome = self.extract_and_restore(&mut workspace, &backup).await;
        let failed_stage = self.stage;

        self.enter(ImportStage::CleaningUp);
        let warnings = workspace.cleanup();

        match outcome {
            Ok(payload) => {
                self.enter(ImportStage::Succeeded);
                Ok(ImportReport {
                    key: backup.object.key,
                    last_modified: backup.object.last_modified,
                    format: backup.format,
                    downloaded_bytes: backup.bytes.len(),
                    payload_path: payload.path,
                    payload_bytes: payload.bytes,
                    warnings,
                })
            }
            Err(error) => Err(self.fail(failed_stage, error, warnings)),
        }
    }

    /// Listing through detection. Nothing is written locally here.
    async fn fetch_latest(&mut self) -> Result<DownloadedBackup> {
        self.enter(ImportStage::Listing);
        let candidates = selection::list_backups(self.store, &self.config.prefix).await?;

        self.enter(ImportStage::Selecting);
        let object = selection::select_latest(&candidates)?.clone();
        tracing::info!(
            "Latest backup is {} (last modified {})",
            object.key,
            format_timestamp(object.last_modified)
        );

        self.enter(ImportStage::Downloading);
        let bytes = self
            .store
            .get(&object.key)
            .await
            .map_err(|e| ImportError::Remote(format!("{:#}", e)))?;
        let content_type = self
            .store
            .content_type(&object.key)
            .await
            .map_err(|e| ImportError::Remote(format!("{:#}", e)))?;
        tracing::info!("Downloaded {} bytes of {}", bytes.len(), object.key);

        self.enter(ImportStage::Detecting);
        let Some(format) = ArchiveFormat::from_content_type(&content_type) else {
            return Err(ImportError::UnsupportedArchiveFormat {
                key: object.key,
                content_type,
            });
        };
        match format {
            ArchiveFormat::Gzip => tracing::info!("GZip file detected 🕵️"),
            ArchiveFormat::Zip => tracing::info!("Zip file detected 🕵️"),
        }

        Ok(DownloadedBackup {
            object,
            format,
            bytes,
        })
    }

    async fn extract_and_restore(
        &mut self,
        workspace: &mut ScratchWorkspace,
        backup: &DownloadedBackup,
    ) -> Result<db_restore::RestoredPayload> {
        tracing::debug!("Using scratch workspace {}", workspace.root().display());
        let archive_path = workspace.write_archive(backup.format.extension(), &backup.bytes)?;
        let destination = archive::extract(backup.format, &archive_path, &workspace.destination())?;

        self.enter(ImportStage::Restoring);
        tracing::warn!("Overwriting the target database with the contents of {}", backup.object.key);
        db_restore::restore_payload(
            self.database,
            &destination,
            self.config.zip_full_path.as_deref(),
        )
        .await
    }

    fn enter(&mut self, stage: ImportStage) {
        tracing::debug!(from = %self.stage, to = %stage, "import stage transition");
        self.stage = stage;
        self.history.push(stage);
        match stage {
            ImportStage::Idle => {}
            ImportStage::Listing => {
                tracing::info!("Listing backups under '{}' 📂", self.config.prefix)
            }
            ImportStage::Selecting => tracing::info!("Selecting the latest backup 🔎"),
            ImportStage::Downloading => tracing::info!("Downloading latest backup ⬇️"),
            ImportStage::Detecting => tracing::info!("Detecting archive format"),
            ImportStage::Extracting => tracing::info!("Extracting backup 📦"),
            ImportStage::Restoring => tracing::info!("Importing backup into database 🚚"),
            ImportStage::CleaningUp => tracing::info!("Cleaning up 🧹"),
            ImportStage::Succeeded => tracing::info!("Finished 🎉"),
            // Logged with its cause by `fail`.
            ImportStage::Failed => {}
        }
    }

    fn fail(
        &mut self,
        stage: ImportStage,
        error: ImportError,
        warnings: Vec<CleanupWarning>,
    ) -> ImportFailure {
        tracing::error!("❌ Import failed while {}: {}", stage, error);
        self.enter(ImportStage::Failed);
        ImportFailure {
            stage,
            error,
            warnings,
        }
    }
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
