//! The `run` command: one full dispatch over the catalog.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::{
    DispatchMode, Settings, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SIGN_TTL_SECS,
};
use crate::dispatch::{DispatchEvent, Dispatcher};
use crate::recognize::HttpRecognitionClient;
use crate::storage::S3ObjectStore;

/// Arguments for `ocrsweep run`.
#[derive(Args)]
pub struct RunArgs {
    /// Storage bucket holding the objects
    #[arg(long, env = "BUCKET_NAME", default_value = "")]
    bucket: String,

    /// Key prefix narrowing the listing
    #[arg(long, env = "PREFIX", default_value = "")]
    prefix: String,

    /// Base address of the recognition service
    #[arg(long = "service-url", env = "API_URL", default_value = "")]
    service_url: String,

    /// Maximum concurrent recognitions (individual mode)
    #[arg(long, env = "MAX_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Objects per recognition call (batch mode)
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Group objects into sequential batch calls instead of fanning out
    #[arg(long, env = "USE_BATCH")]
    batch: bool,

    /// Signed URL lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_SIGN_TTL_SECS)]
    sign_ttl: u64,

    /// Recognition request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout: u64,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl RunArgs {
    fn settings(&self) -> Settings {
        Settings {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            service_url: self.service_url.clone(),
            concurrency: self.concurrency,
            batch_size: self.batch_size,
            mode: if self.batch {
                DispatchMode::Batch
            } else {
                DispatchMode::Individual
            },
            sign_ttl_secs: self.sign_ttl,
            request_timeout_secs: self.timeout,
        }
    }
}

/// Execute one dispatch run and emit the report.
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let settings = args.settings();
    settings.validate()?;

    println!(
        "{} run started at {} ({:?} mode)",
        style("→").cyan(),
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
        settings.mode,
    );

    let store = Arc::new(
        S3ObjectStore::from_env(&settings.bucket, &settings.prefix, settings.sign_ttl()).await,
    );
    let recognizer = Arc::new(HttpRecognitionClient::new(
        &settings.service_url,
        settings.request_timeout(),
    ));

    let dispatcher = Dispatcher::new(store.clone(), store, recognizer, settings);

    // First ctrl-c stops admission; in-flight calls still drain into the
    // report.
    let cancel = dispatcher.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{} cancelling: waiting for in-flight calls to finish",
                style("!").yellow()
            );
            cancel.cancel();
        }
    });

    let (event_tx, event_rx) = mpsc::channel(64);
    let progress = tokio::spawn(render_progress(event_rx));

    let report = dispatcher.run(event_tx).await?;
    let _ = progress.await;

    println!(
        "{} {} succeeded, {} failed of {} listed",
        style("✓").green(),
        report.success_count(),
        report.failed_count(),
        report.processed_count,
    );
    for line in &report.error_lines {
        eprintln!("  {} {}", style("✗").red(), line);
    }

    let json = serde_json::to_string_pretty(&report)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("writing report to {}", path.display()))?;
            println!("{} report written to {}", style("✓").green(), path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}

/// Render dispatch events as a progress bar.
async fn render_progress(mut events: mpsc::Receiver<DispatchEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.recv().await {
        match event {
            DispatchEvent::Started { total, .. } => {
                let pb = ProgressBar::new(total as u64);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                        )
                        .unwrap()
                        .progress_chars("#>-"),
                );
                bar = Some(pb);
            }
            DispatchEvent::ObjectCompleted { identifier, failed } => {
                if let Some(pb) = &bar {
                    pb.inc(1);
                    if failed {
                        pb.set_message(format!("failed: {identifier}"));
                    }
                }
            }
            DispatchEvent::GroupCompleted {
                size, collapsed, ..
            } => {
                if let Some(pb) = &bar {
                    pb.inc(size as u64);
                    if collapsed {
                        pb.set_message("group failed");
                    }
                }
            }
            DispatchEvent::Cancelled => {
                if let Some(pb) = &bar {
                    pb.set_message("cancelled");
                }
            }
        }
    }

    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
}
