//! WebSocket transport to the deploy server.

pub mod client;

pub use client::Connection;
