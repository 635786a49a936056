//! The `list` command: preview the catalog without dispatching.

use std::time::Duration;

use clap::Args;
use console::style;

use crate::config::{ConfigError, DEFAULT_SIGN_TTL_SECS};
use crate::storage::{ObjectCatalog, S3ObjectStore};

/// Arguments for `ocrsweep list`.
#[derive(Args)]
pub struct ListArgs {
    /// Storage bucket holding the objects
    #[arg(long, env = "BUCKET_NAME", default_value = "")]
    bucket: String,

    /// Key prefix narrowing the listing
    #[arg(long, env = "PREFIX", default_value = "")]
    prefix: String,
}

/// Print the identifiers a run would process.
pub async fn list(args: ListArgs) -> anyhow::Result<()> {
    if args.bucket.is_empty() {
        return Err(ConfigError::Missing("bucket (BUCKET_NAME)").into());
    }

    let store = S3ObjectStore::from_env(
        &args.bucket,
        &args.prefix,
        Duration::from_secs(DEFAULT_SIGN_TTL_SECS),
    )
    .await;

    let identifiers = store.list_objects().await?;
    for identifier in &identifiers {
        println!("{identifier}");
    }
    println!(
        "{} {} objects under {}/{}",
        style("✓").green(),
        identifiers.len(),
        args.bucket,
        args.prefix
    );

    Ok(())
}
