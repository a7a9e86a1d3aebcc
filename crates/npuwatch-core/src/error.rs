use thiserror::Error;

/// A data line had enough tokens but one of them was not numeric.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {token:?}")]
pub struct ParseError {
    pub field: &'static str,
    pub token: String,
}

#[derive(Error, Debug)]
pub enum NpuWatchError {
    #[error("Failed to spawn monitor command: {0}")]
    Spawn(std::io::Error),

    #[error("Monitor command not found: {0}")]
    CommandNotFound(String),

    #[error("Monitor command is empty")]
    EmptyCommand,

    #[error("Failed to open pseudo-terminal: {0}")]
    Pty(std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NpuWatchError>;
