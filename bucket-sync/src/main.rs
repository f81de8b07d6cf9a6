use std::sync::Arc;

use anyhow::Context;
use bucket_sync::config::SyncConfig;
use bucket_sync::outputs::{OutputWriter, summary_json};
use bucket_sync::sync::engine::{SyncEngine, SyncReport};
use bucket_sync_core::{CloudFrontClient, S3Store, load_sdk_config};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    Help,
    Version,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => mode = CliMode::Help,
            "--version" | "-V" => mode = CliMode::Version,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            println!("Usage: bucket-sync [--help | --version]");
            println!("  Inputs are read from INPUT_* environment variables, e.g.");
            println!("  INPUT_AWS_BUCKET_NAME, INPUT_SOURCE, INPUT_COMPARE.");
            return Ok(());
        }
        CliMode::Version => {
            println!("bucket-sync {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        CliMode::Run => {}
    }
    init_tracing();

    let result = run().await;
    if let Err(err) = &result {
        annotate_failure(&format!("{err:#}"));
    }
    result
}

async fn run() -> anyhow::Result<()> {
    let config = SyncConfig::from_env().context("invalid configuration")?;
    info!(
        bucket = %config.bucket,
        prefix = %config.prefix,
        source = %config.source.display(),
        compare = config.compare,
        "starting sync"
    );

    let sdk_config = load_sdk_config(&config.aws).await;
    let store = S3Store::new(&sdk_config, config.bucket.clone(), config.aws.force_path_style());
    let mut engine = SyncEngine::new(config.clone(), Arc::new(store));
    if config.distribution_id.is_some() {
        engine = engine.with_cdn(Arc::new(CloudFrontClient::new(&sdk_config)));
    }

    let outputs = OutputWriter::from_env();
    match engine.run().await {
        Ok(report) => {
            info!(
                status = ?report.status,
                uploaded = report.uploaded.len(),
                failed = report.failed.len(),
                "sync finished"
            );
            log_summary(&report);
            outputs
                .write_report(&report)
                .await
                .context("failed to write step outputs")?;
            Ok(())
        }
        Err(err) => {
            if let Some(report) = err.report() {
                log_summary(report);
                if let Err(output_err) = outputs.write_report(report).await {
                    error!(error = %output_err, "failed to write step outputs");
                }
            }
            Err(anyhow::Error::new(err).context(failure_context(&config)))
        }
    }
}

fn log_summary(report: &SyncReport) {
    match summary_json(report) {
        Ok(summary) => info!(%summary, "sync report"),
        Err(err) => error!(error = %err, "failed to encode sync report"),
    }
}

fn failure_context(config: &SyncConfig) -> String {
    format!("sync of {} to bucket {} failed", config.source.display(), config.bucket)
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// Workflow command picked up by the runner's log parser.
fn annotate_failure(message: &str) {
    if std::env::var("GITHUB_ACTIONS").is_ok_and(|value| value == "true") {
        println!("{}", error_annotation(message));
    }
}

fn error_annotation(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::error::{escaped}")
}
