use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pan123_api::Client;
use pan123_uploader::logging::init_logging;
use pan123_uploader::uploader::{FnProgress, ProgressUpdate};
use pan123_uploader::{AppConfig, LogConfig, UploadError, UploadRequest, Uploader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Upload a file to 123pan and print its file id
#[derive(Debug, Parser)]
#[command(name = "pan123-upload", version)]
struct Cli {
    /// Local file to upload
    local_path: PathBuf,

    /// Destination path; directories in it are created on the server
    remote_path: String,

    /// Config file (default: ~/.pan123/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Id of the remote parent directory (0 is the root)
    #[arg(long, default_value_t = 0)]
    parent_id: u64,

    /// Replace an existing file with the same name instead of keeping both
    #[arg(long)]
    overwrite: bool,

    /// Slices uploaded in parallel (overrides the config file)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Do not draw a progress bar
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(1);
        }
    };

    let _log_guard = match init_logging(LogConfig::from_app_config(&config)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(1);
        }
    };

    match run(cli, config).await {
        Ok(file_id) => {
            println!("Uploaded FileID: {}", file_id);
            ExitCode::SUCCESS
        }
        Err(e) => match e.downcast_ref::<UploadError>() {
            Some(upload_err) if upload_err.is_timeout() => {
                eprintln!("Upload outcome unknown: {}", upload_err);
                ExitCode::from(2)
            }
            Some(upload_err) => {
                eprintln!("Upload failed [{}]: {}", upload_err.kind(), upload_err);
                ExitCode::from(1)
            }
            None => {
                eprintln!("Error: {:#}", e);
                ExitCode::from(1)
            }
        },
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<u64> {
    let mut uploader_config = config.uploader_config();
    if let Some(concurrency) = cli.concurrency {
        uploader_config.slice_concurrency = concurrency;
    }

    let client = Client::new(config.client_config()).context("Failed to create API client")?;
    let uploader = Uploader::new(Arc::new(client), uploader_config)?;

    let request = UploadRequest::new(cli.local_path, cli.remote_path)
        .with_parent_id(cli.parent_id)
        .with_overwrite(cli.overwrite);

    let cancel_token = CancellationToken::new();
    let trigger = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(target: "main", "Interrupted, cancelling upload");
            trigger.cancel();
        }
    });

    let bar = if cli.no_progress {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let progress_bar = bar.clone();
    let progress = FnProgress(move |update: ProgressUpdate| {
        progress_bar.set_length(update.total_size);
        progress_bar.set_position(update.uploaded);
        progress_bar.set_message(format!(
            "slice {}/{}",
            update.completed_slices, update.total_slices
        ));
    });

    let result = uploader
        .upload_with(&request, &progress, &cancel_token)
        .await;
    bar.finish_and_clear();

    Ok(result?)
}
