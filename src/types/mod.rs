//! Session Types
//!
//! Core type definitions for tokens, traces and configuration.

pub mod config;
pub mod token;
pub mod trace;

pub use config::*;
pub use token::*;
pub use trace::*;
