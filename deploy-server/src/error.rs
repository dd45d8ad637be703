use deploy_core::{ErrorKind, ManifestError, WalkError};
use std::path::PathBuf;
use std::time::Duration;

/// Failure of a single protocol operation.
///
/// Every variant is recovered at the operation boundary and turned into an
/// `error` message; none of them closes the connection.
#[derive(thiserror::Error, Debug)]
pub enum DeployError {
    #[error("invalid site name: {0:?}")]
    InvalidSite(String),

    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    #[error("site {0} has not been provisioned")]
    SiteNotProvisioned(String),

    #[error("invalid payload encoding: {0}")]
    Payload(#[from] base64::DecodeError),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Unlink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to provision site {site}: {reason}")]
    SiteProvision { site: String, reason: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DeployError {
    /// Wire classification reported to the publisher
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::InvalidSite(_) | DeployError::InvalidPath(_) | DeployError::Payload(_) => {
                ErrorKind::InvalidRequest
            }
            DeployError::SiteNotProvisioned(_) => ErrorKind::SiteNotProvisioned,
            DeployError::Walk(_) => ErrorKind::WalkError,
            DeployError::Write { .. } => ErrorKind::WriteError,
            DeployError::Unlink { .. } => ErrorKind::UnlinkError,
            DeployError::SiteProvision { .. } => ErrorKind::SiteProvisionError,
            DeployError::Timeout { .. } => ErrorKind::Timeout,
            DeployError::Manifest(_) | DeployError::Join(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn provision(site: &str, reason: impl Into<String>) -> Self {
        DeployError::SiteProvision {
            site: site.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a connection was refused before the upgrade
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("connection key header missing")]
    Missing,

    #[error("connection key header is not valid text")]
    Malformed,

    #[error("connection key mismatch")]
    Mismatch,
}
