use std::{path::Path, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};
use upqueue_contract::{EntryStatus, FileCandidate, QueueConfiguration};
use upqueue_engine::{QueueEvent, UploadQueue};
use upqueue_transfer::{load_configuration, HttpTransferEndpoint};

#[derive(Debug, Parser)]
#[command(author, version, about = "Batched multipart upload queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stage the given files and drain them to the configured endpoint.
    Upload {
        #[arg(long, default_value = "config/upqueue.toml")]
        config: PathBuf,
        /// Overrides `remote.config_url` from the config file.
        #[arg(long)]
        remote_config: Option<String>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the effective queue configuration after the remote overlay.
    ShowConfig {
        #[arg(long, default_value = "config/upqueue.toml")]
        config: PathBuf,
        #[arg(long)]
        remote_config: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RuntimeConfig {
    #[serde(default)]
    queue: QueueConfiguration,
    remote: Option<RemoteSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteSection {
    config_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reqwest=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Upload {
            config,
            remote_config,
            files,
        } => upload(config, remote_config, files).await,
        Command::ShowConfig {
            config,
            remote_config,
        } => show_config(config, remote_config).await,
    }
}

fn read_runtime_config(config_path: &Path) -> Result<RuntimeConfig> {
    if !config_path.exists() {
        warn!(path = %config_path.display(), "config file not found, using built-in defaults");
        return Ok(RuntimeConfig::default());
    }
    let source = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read config file {}", config_path.display()))?;
    toml::from_str(&source)
        .with_context(|| format!("invalid config TOML at {}", config_path.display()))
}

async fn effective_config(
    client: &reqwest::Client,
    config_path: &Path,
    remote_override: Option<String>,
) -> Result<QueueConfiguration> {
    let runtime = read_runtime_config(config_path)?;
    runtime
        .queue
        .validate()
        .with_context(|| format!("invalid [queue] section in {}", config_path.display()))?;

    let remote_url = remote_override.or_else(|| runtime.remote.and_then(|r| r.config_url));
    Ok(load_configuration(client, remote_url.as_deref(), runtime.queue).await)
}

async fn show_config(config_path: PathBuf, remote_config: Option<String>) -> Result<()> {
    let client = reqwest::Client::new();
    let config = effective_config(&client, &config_path, remote_config).await?;
    let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}

async fn upload(
    config_path: PathBuf,
    remote_config: Option<String>,
    files: Vec<PathBuf>,
) -> Result<()> {
    let client = reqwest::Client::new();
    let config = effective_config(&client, &config_path, remote_config).await?;
    info!(
        target_url = %config.transfer_target.url,
        max_concurrent = config.max_concurrent_transfers,
        batching = config.batching_enabled,
        "upload queue configured"
    );

    let mut candidates = Vec::with_capacity(files.len());
    for path in &files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        candidates.push(FileCandidate::new(name, media_type_for(path), data));
    }

    let queue = UploadQueue::new(config, Arc::new(HttpTransferEndpoint::new(client)))
        .context("invalid queue configuration")?;

    let report = queue.admit(candidates).await;
    for rejection in &report.rejections {
        warn!(reason = %rejection, "file rejected");
    }
    if report.accepted == 0 {
        bail!("none of the {} files were accepted", files.len());
    }

    let mut events = queue.events();
    queue.start().await;

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            _ = &mut interrupt => {
                warn!("interrupted, cancelling live transfers");
                queue.shutdown().await;
                break;
            }
            event = events.next() => match event {
                Some(Ok(QueueEvent::Drained)) | None => break,
                Some(Ok(QueueEvent::Progress { entry_id, progress, eta })) => {
                    debug!(entry_id = %entry_id, progress, eta, "upload progress");
                }
                Some(Ok(QueueEvent::Settled { entry_id, status })) => {
                    let summary = queue.summary().await;
                    info!(
                        entry_id = %entry_id,
                        status = ?status,
                        overall = summary.progress,
                        "entry settled"
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(lagged)) => warn!(error = %lagged, "event stream lagged"),
            }
        }
    }

    for entry in queue.entries().await {
        match entry.status {
            EntryStatus::Success => println!(
                "{}\t{}",
                entry.name,
                entry.result_location.unwrap_or_default()
            ),
            EntryStatus::Error => println!(
                "{}\tFAILED: {}",
                entry.name,
                entry.error.unwrap_or_default()
            ),
            status => println!("{}\t{:?}", entry.name, status),
        }
    }

    let summary = queue.summary().await;
    info!(
        total = summary.total_files,
        completed = summary.completed_files,
        failed = summary.failed_files,
        "upload run finished"
    );
    if summary.failed_files > 0 {
        bail!("{} of {} uploads failed", summary.failed_files, summary.total_files);
    }
    Ok(())
}

fn media_type_for(path: &Path) -> String {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => mime::IMAGE_JPEG.to_string(),
        "png" => mime::IMAGE_PNG.to_string(),
        "gif" => mime::IMAGE_GIF.to_string(),
        "webp" => "image/webp".to_string(),
        "pdf" => mime::APPLICATION_PDF.to_string(),
        "txt" => mime::TEXT_PLAIN.to_string(),
        "json" => mime::APPLICATION_JSON.to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}
