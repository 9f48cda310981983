use anyhow::Context;
use chrono::Local;
use clap::Parser;
use refund_recon::config::{CliArgs, Command, LogFormat, StorageBackend, TomlConfig};
use refund_recon::core::{BlobStore, Loader, Orchestrator, StagingStore};
use refund_recon::domain::model::{LoadSummary, PreviewResult, TargetMonth};
use refund_recon::utils::error::{ErrorSeverity, ReconError};
use refund_recon::utils::{logger, validation};
use refund_recon::utils::validation::Validate;
use refund_recon::{HttpWarehouse, LocalBlobStore};
use std::path::Path;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // 初始化日誌
    match args.log_format {
        LogFormat::Text => logger::init_cli_logger(args.verbose),
        LogFormat::Json => logger::init_json_logger(args.verbose),
    }

    if let Err(e) = run(args).await {
        let Some(err) = e.downcast_ref::<ReconError>() else {
            tracing::error!("❌ {:#}", e);
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        };

        tracing::error!(
            "❌ {} (Category: {:?}, Severity: {:?})",
            err,
            err.category(),
            err.severity()
        );
        eprintln!("❌ {}", err.user_friendly_message());
        eprintln!("💡 {}", err.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match err.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    let config = TomlConfig::from_file(&args.config)?;
    config.validate()?;
    tracing::debug!("Loaded configuration from {}", args.config.display());

    let mut warehouse = HttpWarehouse::new(&config.warehouse.endpoint, &config.warehouse.project);
    if let Some(token) = config.access_token() {
        warehouse = warehouse.with_access_token(token);
    }

    match config.storage.backend {
        StorageBackend::Local => {
            let root = validation::validate_required_field("storage.root", &config.storage.root)?;
            let mut store = LocalBlobStore::new(root, &config.storage.bucket);
            if let Some(scheme) = &config.storage.uri_scheme {
                store = store.with_uri_scheme(scheme);
            }
            execute(args, &config, store, warehouse).await
        }
        #[cfg(feature = "s3")]
        StorageBackend::S3 => {
            let store = refund_recon::S3BlobStore::from_settings(
                config.storage.bucket.clone(),
                config.storage.region.clone(),
                config.storage.endpoint.clone(),
            )
            .await;
            execute(args, &config, store, warehouse).await
        }
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => Err(ReconError::Config {
            message: "storage.backend = \"s3\" requires building with the `s3` feature".to_string(),
        }
        .into()),
    }
}

async fn execute<S: BlobStore>(
    args: CliArgs,
    config: &TomlConfig,
    store: S,
    warehouse: HttpWarehouse,
) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(
        StagingStore::new(store, config.staging_prefix()),
        Loader::new(warehouse, config.poll_settings()),
        config.orchestrator_settings(),
    );

    match &args.command {
        Command::Submit { file, .. } => {
            let month = resolve_month(args.command.month())?;
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let preview = orchestrator.submit(&file_name(file), &bytes, month).await?;
            print_preview(&preview, args.json)?;
        }
        Command::Confirm { .. } => {
            let summary = orchestrator.confirm(resolve_month(args.command.month())?).await?;
            print_summary(&summary, args.json)?;
        }
        Command::Load { .. } => {
            let summary = orchestrator.retry_load(resolve_month(args.command.month())?).await?;
            print_summary(&summary, args.json)?;
        }
        Command::Cancel => {
            let deleted = orchestrator.cancel().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&deleted)?);
            } else {
                println!("🗑️ Deleted {} staged artifact(s)", deleted.len());
                for key in &deleted {
                    println!("   {}", key);
                }
            }
        }
    }

    Ok(())
}

/// 未指定月份時使用上個月；一月必須明確指定
fn resolve_month(explicit: Option<TargetMonth>) -> Result<TargetMonth, ReconError> {
    match explicit {
        Some(month) => Ok(month),
        None => TargetMonth::preceding(Local::now().date_naive()),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

fn print_preview(preview: &PreviewResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(preview)?);
        return Ok(());
    }

    println!(
        "📋 {} row(s) staged for {} at {}",
        preview.row_count, preview.target_month, preview.uri
    );
    println!("{:<10} {:<16} {:<10} {:>12} {:<7}", "provider", "order_id", "date", "amount", "country");
    for row in &preview.rows {
        println!(
            "{:<10} {:<16} {:<10} {:>12} {:<7}",
            row.provider,
            row.order_id,
            row.date.format("%Y-%m-%d"),
            format_minor_units(row.amount_minor_units),
            row.country
        );
    }
    if preview.row_count > preview.rows.len() {
        println!("... and {} more", preview.row_count - preview.rows.len());
    }
    println!(
        "👉 Run `refund-recon confirm --month {}` to load, or `refund-recon cancel` to discard",
        preview.target_month
    );
    Ok(())
}

fn print_summary(summary: &LoadSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("✅ {} loaded into {} (job {})", summary.source_uri, summary.table, summary.job_id);
    if let Some(rows) = summary.rows_loaded {
        println!("📊 {} row(s) appended", rows);
    }
    Ok(())
}
