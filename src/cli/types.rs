use thiserror::Error;

use crate::config_store::{ConfigError, ConfigStatus};

/// Errors that can occur during CLI command execution.
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid arguments were provided to a command.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The store could not be opened or a directory could not be loaded.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Access control refused the operation.
    ///
    /// Supply `--root-pass` or `--token` for private files and `_` keys.
    #[error("Access denied for '{0}'")]
    Denied(String),

    /// The key does not exist.
    #[error("Key not found: {0}")]
    NotFound(String),

    /// The file could not be written; the in-memory value was rolled back.
    #[error("Failed to persist '{key}' (store status: {status})")]
    WriteFailed {
        /// Key whose write was rolled back
        key: String,
        /// Store status after the failure
        status: ConfigStatus,
    },
}

/// Type alias for command execution results.
///
/// Commands return the text to print on success.
pub type CommandResult = Result<String, CliError>;
