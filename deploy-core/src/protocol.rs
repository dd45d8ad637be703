//! Wire protocol spoken over the deploy WebSocket.
//!
//! Every frame is a single JSON text message discriminated by `messageType`.
//! The publisher authenticates out-of-band with the [`CONNECTION_KEY_HEADER`]
//! header on the upgrade request.

use crate::manifest::Manifest;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Version announced in the `hello` message
pub const PROTOCOL_VERSION: &str = "1.0";

/// Upgrade request header carrying the shared secret
pub const CONNECTION_KEY_HEADER: &str = "x-connection-key";

/// Messages sent by the publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Request the site's manifest; creates the deployment directory if absent
    GetManifest { site: String },

    /// Write or overwrite one file
    Store {
        site: String,
        path: String,
        /// Base64 encoded file content
        data: String,
        /// Modification time to stamp on the written file (epoch ms)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mtime: Option<i64>,
    },

    /// Remove one file
    Delete { site: String, path: String },

    /// Provision a new site
    CreateSite { site: String },
}

impl ClientMessage {
    /// Wire name of the operation, used in error responses and logs
    pub fn operation(&self) -> &'static str {
        match self {
            ClientMessage::GetManifest { .. } => "getManifest",
            ClientMessage::Store { .. } => "store",
            ClientMessage::Delete { .. } => "delete",
            ClientMessage::CreateSite { .. } => "createSite",
        }
    }

    pub fn site(&self) -> &str {
        match self {
            ClientMessage::GetManifest { site }
            | ClientMessage::Store { site, .. }
            | ClientMessage::Delete { site, .. }
            | ClientMessage::CreateSite { site } => site,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            ClientMessage::Store { path, .. } | ClientMessage::Delete { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Messages sent by the deploy server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Sent once, immediately after successful authentication
    Hello { version: String },

    Manifest { site: String, manifest: Manifest },

    Stored { site: String, path: String },

    Deleted { site: String, path: String },

    SiteCreated { site: String },

    /// Failure of a single operation. The connection stays open.
    Error {
        operation: String,
        kind: ErrorKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        site: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        message: String,
    },
}

impl ServerMessage {
    pub fn hello() -> Self {
        ServerMessage::Hello {
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// Failure taxonomy reported in `error` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    WalkError,
    WriteError,
    UnlinkError,
    SiteProvisionError,
    SiteNotProvisioned,
    InvalidRequest,
    Timeout,
    Internal,
}

/// Encode file content for a `store` message
pub fn encode_payload(content: &[u8]) -> String {
    STANDARD.encode(content)
}

/// Decode the `data` field of a `store` message
pub fn decode_payload(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileDescriptor;

    #[test]
    fn test_hello_serialization() {
        let json = serde_json::to_value(ServerMessage::hello()).unwrap();
        assert_eq!(json, serde_json::json!({"messageType": "hello", "version": "1.0"}));
    }

    #[test]
    fn test_client_message_deserialization() {
        let json = r#"{"messageType":"getManifest","site":"demo.example.com"}"#;
        let message: ClientMessage = serde_json::from_str(json).unwrap();

        match message {
            ClientMessage::GetManifest { site } => assert_eq!(site, "demo.example.com"),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_store_without_mtime() {
        let json = r#"{"messageType":"store","site":"s","path":"a/b.txt","data":"aGk="}"#;
        let message: ClientMessage = serde_json::from_str(json).unwrap();

        assert_eq!(message.operation(), "store");
        assert_eq!(message.path(), Some("a/b.txt"));
        match message {
            ClientMessage::Store { data, mtime, .. } => {
                assert_eq!(decode_payload(&data).unwrap(), b"hi");
                assert_eq!(mtime, None);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_create_site_tag() {
        let json = serde_json::to_string(&ClientMessage::CreateSite {
            site: "a.example.com".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""messageType":"createSite""#));
    }

    #[test]
    fn test_manifest_message_shape() {
        let manifest = Manifest::from_descriptors(vec![FileDescriptor {
            path: "index.html".to_string(),
            mtime: 1000,
            size: 50,
        }])
        .unwrap();

        let json = serde_json::to_value(ServerMessage::Manifest {
            site: "s".to_string(),
            manifest,
        })
        .unwrap();

        assert_eq!(json["messageType"], "manifest");
        assert_eq!(json["manifest"][0]["path"], "index.html");
        assert_eq!(json["manifest"][0]["mtime"], 1000);
    }

    #[test]
    fn test_error_omits_missing_fields() {
        let json = serde_json::to_value(ServerMessage::Error {
            operation: "getManifest".to_string(),
            kind: ErrorKind::WalkError,
            site: Some("s".to_string()),
            path: None,
            message: "boom".to_string(),
        })
        .unwrap();

        assert_eq!(json["kind"], "walkError");
        assert!(json.get("path").is_none());
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        let json = r#"{"messageType":"format","site":"s"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }
}
