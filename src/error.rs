//! Error types for Pluck

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluckError {
    #[error("Accessibility API error: {0}")]
    Accessibility(String),

    #[error("Event tap error: {0}")]
    EventTap(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("Activation failed: {0}")]
    Activation(String),

    #[error("Menu bar error: {0}")]
    MenuBar(String),

    #[error("{0} is only supported on macOS")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, PluckError>;
