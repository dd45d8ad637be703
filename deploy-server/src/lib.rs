//! Deploy Server Library
//!
//! Keeps each hosted site's deployment directory in sync with a publisher
//! over an authenticated WebSocket, and provisions new sites behind the
//! reverse proxy.

pub mod auth;
pub mod config;
pub mod error;
pub mod manifest;
pub mod paths;
pub mod routes;
pub mod site;
pub mod state;
pub mod transfer;
pub mod ws;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::DeployError;
pub use state::AppState;
