mod logic;
pub(crate) mod archive;
pub(crate) mod db_restore;
pub(crate) mod s3_download;
pub(crate) mod selection;
pub(crate) mod workspace;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::{Context, Result};

use crate::config::AppConfig;

use db_restore::PgDatabase;
use s3_download::S3Store;

pub use logic::{ImportPipeline, ImportReport, ImportStage};

/// Public entry point for the import process: restores the newest backup
/// under the configured prefix into the target database.
///
/// The target database is overwritten by whatever the backup's SQL does.
pub async fn run_import_flow(app_config: &AppConfig) -> Result<ImportReport> {
    let store = S3Store::connect(&app_config.spaces_config).await?;
    let database = PgDatabase::connect(
        &app_config.target_db_url,
        app_config.import_config.single_transaction,
    )
    .await?;

    let mut pipeline = ImportPipeline::new(&store, &database, &app_config.import_config);
    match pipeline.run().await {
        Ok(report) => {
            tracing::info!(
                key = %report.key,
                last_modified = report.last_modified,
                payload = %report.payload_path.display(),
                format = %report.format,
                downloaded_bytes = report.downloaded_bytes,
                payload_bytes = report.payload_bytes,
                "Import succeeded"
            );
            for warning in &report.warnings {
                tracing::warn!("Cleanup warning: {}", warning);
            }
            Ok(report)
        }
        Err(failure) => {
            tracing::debug!(stage = %pipeline.stage(), history = ?pipeline.history(), "Pipeline halted");
            for warning in &failure.warnings {
                tracing::warn!("Cleanup warning: {}", warning);
            }
            Err(failure).context("Import process failed")
        }
    }
}

/// Prints the backups an import would choose from, marking the selected one.
pub async fn run_list_flow(app_config: &AppConfig) -> Result<()> {
    let store = S3Store::connect(&app_config.spaces_config).await?;
    let prefix = &app_config.import_config.prefix;

    let candidates = selection::list_backups(&store, prefix)
        .await
        .context("Failed to list backups")?;
    let selected = selection::select_latest_index(&candidates)?;

    println!(
        "Backups under s3://{}/{}:",
        app_config.spaces_config.bucket_name,
        s3_download::normalize_prefix(prefix)
    );
    for (idx, candidate) in candidates.iter().enumerate() {
        let marker = if idx == selected { "*" } else { " " };
        let modified = chrono::DateTime::from_timestamp(candidate.last_modified, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| candidate.last_modified.to_string());
        println!("{} {}  {}", marker, modified, candidate.key);
    }
    println!("(* = backup that `import` would restore)");
    Ok(())
}
