//! Database Backup Importer
//!
//! Restores the most recent backup found in an S3 bucket into a PostgreSQL database.

// dbimporter/src/main.rs
mod config;
mod errors;
mod restore;
mod utils;

use anyhow::{Context, Result};
use config::AppConfig;
use std::env;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Main entry point for the importer
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dbimporter=info")),
        )
        .init();

    match run_app().await {
        Ok(_) => {
            tracing::info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let config_path = config::config_path();
    let app_config = AppConfig::load_from_json(&config_path)
        .context(format!("Failed to load application configuration from {}", config_path.display()))?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    match choice.as_str() {
        "1" | "import" => {
            tracing::info!(
                "🔄 Importing latest backup into {}",
                utils::redact_db_url(&app_config.target_db_url)
            );
            let report = restore::run_import_flow(&app_config).await?;
            if !report.warnings.is_empty() {
                tracing::warn!(
                    "Import finished with {} cleanup warning(s); check the scratch directory {}",
                    report.warnings.len(),
                    app_config.import_config.scratch_dir.display()
                );
            }
        }
        "2" | "list" => {
            restore::run_list_flow(&app_config).await.context("Listing backups failed")?;
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (import) or '2' (list).");
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(())
}

/// Prompts user to select an operation
///
/// Returns the user's choice as String
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Import latest backup (or type 'import')");
    println!("2. List available backups (or type 'list')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
