//! Utility modules for the publisher.

pub mod errors;

pub use errors::{PublishError, Result};
