//! Publisher - Main entry point

use anyhow::{bail, Result};
use clap::Parser;
use publisher::{Config, PublishOptions, Publisher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sites to publish, named by hostname
    #[arg(required = true)]
    sites: Vec<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "publisher.toml")]
    config: PathBuf,

    /// Provision each site on the server before publishing
    #[arg(long)]
    create_site: bool,

    /// Show what would change without sending anything
    #[arg(long)]
    dry_run: bool,

    /// Directory holding the site source trees (overrides config)
    #[arg(long, value_name = "DIR")]
    source_root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file(&args.config)?;
    if let Some(root) = args.source_root {
        config.source.root = root;
    }

    // Progress goes to stderr; RUST_LOG wins over the configured level
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    tracing::info!("Starting publisher v{}", env!("CARGO_PKG_VERSION"));

    let publisher = Publisher::new(Arc::new(config));
    let options = PublishOptions {
        create_site: args.create_site,
        dry_run: args.dry_run,
    };

    let mut failed_operations = 0;
    let mut failed_sites = Vec::new();
    for (site, outcome) in publisher.publish_all(&args.sites, options).await {
        match outcome {
            Ok(report) => {
                for failure in &report.failures {
                    tracing::error!(
                        "{}: {} ({:?}): {}",
                        site,
                        failure.path,
                        failure.kind,
                        failure.message
                    );
                }
                failed_operations += report.failures.len();
            }
            Err(_) => failed_sites.push(site),
        }
    }

    if !failed_sites.is_empty() {
        bail!(
            "publish aborted for {}; {} other operation(s) failed",
            failed_sites.join(", "),
            failed_operations
        );
    }
    if failed_operations > 0 {
        bail!("{} operation(s) failed", failed_operations);
    }

    Ok(())
}
