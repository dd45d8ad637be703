//! Deploy Core Library
//!
//! Manifest model, wire protocol and directory walker shared by the deploy
//! server and the publisher.

pub mod error;
pub mod fs;
pub mod manifest;
pub mod protocol;

// Re-export commonly used types
pub use error::{ManifestError, WalkError};
pub use manifest::{FileDescriptor, Manifest};
pub use protocol::{ClientMessage, ErrorKind, ServerMessage};
