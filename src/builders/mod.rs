//! Builders
//!
//! Fluent builder for session configuration.

pub mod config;

pub use config::{session_config, SessionConfigBuilder};
