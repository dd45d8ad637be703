//! Routing of authenticated protocol messages to their operations.
//!
//! Every handler turns its outcome into exactly one reply: the operation's
//! acknowledgment on success, an `error` message naming the operation and
//! target on failure.

use crate::error::DeployError;
use crate::state::AppState;
use crate::{manifest, paths, site, transfer};
use deploy_core::protocol::decode_payload;
use deploy_core::{ClientMessage, ErrorKind, ServerMessage};
use tracing::{info, warn};

/// Parse one text frame and dispatch it
pub async fn handle_frame(state: &AppState, text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => dispatch(state, message).await,
        Err(e) => {
            warn!("Failed to parse client message: {}", e);
            ServerMessage::Error {
                operation: "unknown".to_string(),
                kind: ErrorKind::InvalidRequest,
                site: None,
                path: None,
                message: format!("malformed message: {e}"),
            }
        }
    }
}

/// Route a parsed message to its operation
pub async fn dispatch(state: &AppState, message: ClientMessage) -> ServerMessage {
    let operation = message.operation();
    let site = message.site().to_string();
    let path = message.path().map(str::to_string);

    let result = match message {
        ClientMessage::GetManifest { site } => handle_get_manifest(state, site).await,
        ClientMessage::Store {
            site,
            path,
            data,
            mtime,
        } => handle_store(state, site, path, data, mtime).await,
        ClientMessage::Delete { site, path } => handle_delete(state, site, path).await,
        ClientMessage::CreateSite { site } => handle_create_site(state, site).await,
    };

    result.unwrap_or_else(|e| {
        warn!(operation, site = %site, path = ?path, "Operation failed: {}", e);
        ServerMessage::Error {
            operation: operation.to_string(),
            kind: e.kind(),
            site: Some(site),
            path,
            message: e.to_string(),
        }
    })
}

/// Run blocking filesystem work for `site` while holding the site's lock.
///
/// The guard moves into the blocking task, so the lock is held until the
/// work finishes even if the awaiting future is dropped.
async fn run_locked<T, F>(state: &AppState, site: &str, work: F) -> Result<T, DeployError>
where
    F: FnOnce() -> Result<T, DeployError> + Send + 'static,
    T: Send + 'static,
{
    let guard = state.sites.lock(site).await;
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        work()
    })
    .await?
}

async fn handle_get_manifest(state: &AppState, site: String) -> Result<ServerMessage, DeployError> {
    let site_dir = paths::deployment_path(&state.config, &site)?;
    let timeout = state.config.manifest_timeout();

    let walk = run_locked(state, &site, move || manifest::build_manifest(&site_dir));
    let manifest = tokio::time::timeout(timeout, walk)
        .await
        .map_err(|_| DeployError::Timeout {
            operation: "getManifest",
            after: timeout,
        })??;

    info!(site = %site, files = manifest.len(), "Sent manifest");
    Ok(ServerMessage::Manifest { site, manifest })
}

async fn handle_store(
    state: &AppState,
    site: String,
    path: String,
    data: String,
    mtime: Option<i64>,
) -> Result<ServerMessage, DeployError> {
    let site_dir = paths::deployment_path(&state.config, &site)?;
    let content = decode_payload(&data)?;
    let auto_create = state.config.auto_create_sites;

    let (work_site, work_path) = (site.clone(), path.clone());
    let bytes = run_locked(state, &site, move || {
        transfer::store(&work_site, &site_dir, &work_path, &content, mtime, auto_create)
    })
    .await?;

    info!(site = %site, path = %path, bytes, "Stored file");
    Ok(ServerMessage::Stored { site, path })
}

async fn handle_delete(state: &AppState, site: String, path: String) -> Result<ServerMessage, DeployError> {
    let site_dir = paths::deployment_path(&state.config, &site)?;
    let auto_create = state.config.auto_create_sites;

    let (work_site, work_path) = (site.clone(), path.clone());
    let removed = run_locked(state, &site, move || {
        transfer::delete(&work_site, &site_dir, &work_path, auto_create)
    })
    .await?;

    info!(site = %site, path = %path, removed, "Deleted file");
    Ok(ServerMessage::Deleted { site, path })
}

async fn handle_create_site(state: &AppState, site: String) -> Result<ServerMessage, DeployError> {
    paths::validate_site(&site)?;

    let guard = state.sites.lock(&site).await;
    let config = state.config.clone();
    let proxy = state.proxy.clone();
    let task_site = site.clone();

    // Spawned so a dropped connection cannot interrupt provisioning midway.
    tokio::spawn(async move {
        let _guard = guard;
        site::create_site(&config, proxy.as_ref(), &task_site).await
    })
    .await??;

    info!(site = %site, "Site created");
    Ok(ServerMessage::SiteCreated { site })
}
