//! # Chime Common Library
//!
//! Shared code for the chime crates including:
//! - Common error type
//! - Configuration file discovery and TOML loading
//! - Time conversion helpers

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
