//! Publish orchestration.
//!
//! Connect, optionally provision the site, fetch the remote manifest, then
//! stream the diff to the server one acknowledged operation at a time. The
//! diff walks and reads files on the blocking pool and hands operations over
//! a bounded channel, so only a few file bodies are in memory at once.

use crate::config::Config;
use crate::diff::{self, DiffStats, Operation};
use crate::utils::errors::{PublishError, Result};
use crate::ws::Connection;
use deploy_core::fs::WalkOptions;
use deploy_core::{ErrorKind, WalkError};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Operations buffered between the diff and the sender
const OPERATION_QUEUE: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Send `createSite` before syncing
    pub create_site: bool,
    /// Compute and log the change set without sending store, delete or
    /// `createSite`. The `getManifest` request still goes out, and the server
    /// creates the site's deployment directory on it if it does not exist.
    pub dry_run: bool,
}

/// An operation the server refused
#[derive(Debug, Clone)]
pub struct OperationFailure {
    pub path: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one publish run
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub site: String,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub bytes_sent: u64,
    pub failures: Vec<OperationFailure>,
}

impl PublishReport {
    fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
            ..Self::default()
        }
    }

    /// Number of create, update and delete operations applied
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, kind: &str, bytes: u64) {
        match kind {
            "create" => self.created += 1,
            "update" => self.updated += 1,
            _ => self.deleted += 1,
        }
        self.bytes_sent += bytes;
    }
}

pub struct Publisher {
    config: Arc<Config>,
}

impl Publisher {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Publish each site in turn. A site that fails as a whole does not stop
    /// the ones after it.
    pub async fn publish_all(
        &self,
        sites: &[String],
        options: PublishOptions,
    ) -> Vec<(String, Result<PublishReport>)> {
        let mut outcomes = Vec::with_capacity(sites.len());
        for site in sites {
            let outcome = self.publish(site, options).await;
            if let Err(e) = &outcome {
                error!("{}: publish aborted: {}", site, e);
            }
            outcomes.push((site.clone(), outcome));
        }
        outcomes
    }

    /// Bring the server's copy of `site` in line with the local source tree
    pub async fn publish(&self, site: &str, options: PublishOptions) -> Result<PublishReport> {
        let started = Instant::now();
        let source = self.config.site_source(site);
        if !source.is_dir() {
            return Err(PublishError::Config(format!(
                "no source directory for {} at {}",
                site,
                source.display()
            )));
        }

        let mut connection = Connection::connect(
            &self.config.server.url,
            &self.config.server.shared_secret,
            self.config.reply_timeout(),
        )
        .await?;

        if options.create_site {
            if options.dry_run {
                info!("[dry-run] would create site {}", site);
            } else {
                connection.create_site(site).await?;
                info!("Site {} created", site);
            }
        }

        let manifest = connection.get_manifest(site).await?;
        info!(
            "Remote manifest for {}: {} files, {} bytes",
            site,
            manifest.len(),
            manifest.total_bytes()
        );

        let walk_options = WalkOptions {
            follow_links: false,
            exclude_patterns: self.config.source.exclude.clone(),
        };

        let (tx, mut rx) =
            mpsc::channel::<std::result::Result<Operation, WalkError>>(OPERATION_QUEUE);
        let diff_task = tokio::task::spawn_blocking(move || {
            let mut diff = diff::diff(manifest, &source, walk_options);
            for item in diff.by_ref() {
                if tx.blocking_send(item).is_err() {
                    // Receiver gave up
                    break;
                }
            }
            diff.into_stats()
        });

        let mut report = PublishReport::new(site);
        let mut outcome: Result<()> = Ok(());

        while let Some(item) = rx.recv().await {
            let operation = match item {
                Ok(operation) => operation,
                Err(e) => {
                    error!("Local walk failed, no deletes will be sent: {}", e);
                    outcome = Err(e.into());
                    break;
                }
            };

            if options.dry_run {
                info!("[dry-run] {} {}", operation.kind(), operation.path());
                report.record(operation.kind(), operation.payload_len());
                continue;
            }

            let kind = operation.kind();
            let path = operation.path().to_string();
            let bytes = operation.payload_len();
            match connection.apply(site, operation).await {
                Ok(()) => {
                    info!("{} {} ({} bytes)", kind, path, bytes);
                    report.record(kind, bytes);
                }
                Err(PublishError::Remote { kind: error_kind, message, .. }) => {
                    warn!("{} {} failed: {}", kind, path, message);
                    report.failures.push(OperationFailure {
                        path,
                        kind: error_kind,
                        message,
                    });
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        drop(rx);
        let stats: DiffStats = diff_task.await?;
        report.unchanged = stats.unchanged.len();
        outcome?;

        if let Err(e) = connection.close().await {
            warn!("Error closing connection: {}", e);
        }

        info!(
            "Published {} in {:.1}s: {} created, {} updated, {} deleted, {} unchanged, {} failed",
            site,
            started.elapsed().as_secs_f64(),
            report.created,
            report.updated,
            report.deleted,
            report.unchanged,
            report.failures.len()
        );

        Ok(report)
    }
}
