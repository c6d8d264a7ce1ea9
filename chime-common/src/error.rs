//! Errors shared by the chime crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Config file unreadable or a value out of range
    #[error("Config error: {0}")]
    Config(String),

    #[error("Malformed TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value: {0}")]
    InvalidInput(String),
}
