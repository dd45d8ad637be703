//! Publisher Library
//!
//! Brings a deploy server's copy of a site in line with a local source tree,
//! sending only the files that changed.

pub mod config;
pub mod diff;
pub mod publish;
pub mod utils;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use publish::{PublishOptions, PublishReport, Publisher};
pub use utils::errors::{PublishError, Result};
