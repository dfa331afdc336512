use std::{fmt, io, path::PathBuf, time::Instant};

use serde_json::Value;

/// Where an observed change came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSource {
    /// The reload loop noticed the file changed on disk.
    Reload,
    /// A foreground `set` on this store.
    Write,
    /// A foreground `remove` on this store.
    Remove,
}

/// Represents a change to a single top-level config key.
///
/// Either side may be absent: a key that appears has no `old_value`,
/// a key that disappears has no `new_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    /// The config key that changed.
    pub key: String,
    /// The previous value, if the key existed.
    pub old_value: Option<Value>,
    /// The current value, if the key still exists.
    pub new_value: Option<Value>,
    /// What caused the change.
    pub source: ChangeSource,
    /// Timestamp when the change was observed.
    pub timestamp: Instant,
}

impl ConfigChange {
    /// Creates a new configuration change stamped with the current instant.
    ///
    /// # Arguments
    ///
    /// * `key` - The config key
    /// * `old_value` - The previous value of the key (if present)
    /// * `new_value` - The new value of the key (if present)
    /// * `source` - What caused the change
    pub fn new(
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
        source: ChangeSource,
    ) -> Self {
        Self {
            key,
            old_value,
            new_value,
            source,
            timestamp: Instant::now(),
        }
    }

    /// Extracts the new value as a specific type.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Unknown` if the key was removed or the value
    /// cannot be deserialized into the requested type.
    pub fn extract<T>(&self) -> Result<T, ConfigError>
    where
        T: serde::de::DeserializeOwned,
    {
        let value = self.new_value.clone().ok_or_else(|| ConfigError::Unknown {
            details: format!("'{}' was removed", self.key),
        })?;

        serde_json::from_value(value).map_err(|e| ConfigError::Unknown {
            details: format!(
                "'{}' is not a {}: {e}",
                self.key,
                std::any::type_name::<T>()
            ),
        })
    }

    /// Attempts to extract the new value as a string.
    ///
    /// Returns `None` if the value is not a string or the key was removed.
    pub fn as_string(&self) -> Option<String> {
        match &self.new_value {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Extracts the new value as a string with a fallback default.
    pub fn as_string_or(&self, default: &str) -> String {
        self.as_string().unwrap_or_else(|| default.to_string())
    }
}

/// Sticky health code of a store, updated by every reload and failed persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConfigStatus {
    /// The last reload succeeded.
    Correct = 0,
    /// The file on disk is not a valid JSON object.
    DecodeError = 1,
    /// The file does not exist.
    FileNotFound = 2,
    /// The file cannot be read or written by this process.
    PermissionError = 3,
    /// Any other operating system error.
    OsError = 4,
    /// Anything else.
    UnknownError = 5,
}

impl ConfigStatus {
    /// Numeric code of this status.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the store is currently healthy.
    pub fn is_correct(self) -> bool {
        self == Self::Correct
    }
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Correct => "correct",
            Self::DecodeError => "decode error",
            Self::FileNotFound => "file not found",
            Self::PermissionError => "permission error",
            Self::OsError => "os error",
            Self::UnknownError => "unknown error",
        };

        write!(f, "{label} ({})", self.code())
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file contents are not valid JSON.
    #[error("failed to parse JSON from '{path}': {source}")]
    Decode {
        /// File that failed to parse
        path: PathBuf,
        /// Parser error
        source: serde_json::Error,
    },

    /// The file is valid JSON but not an object.
    #[error("config file '{path}' does not contain a JSON object")]
    NotAnObject {
        /// Offending file
        path: PathBuf,
    },

    /// The file does not exist.
    #[error("config file '{path}' not found")]
    NotFound {
        /// Missing file
        path: PathBuf,
    },

    /// The process may not access the file.
    #[error("permission denied on '{path}'")]
    PermissionDenied {
        /// File that could not be accessed
        path: PathBuf,
    },

    /// Any other I/O failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// Path where the I/O error occurred
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The directory loader was pointed at something that is not a directory.
    #[error("'{path}' is not a directory")]
    NotADirectory {
        /// Offending path
        path: PathBuf,
    },

    /// A construction-time argument was rejected.
    #[error("invalid {field}: {reason}")]
    InvalidArgument {
        /// Name of the rejected argument
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Catch-all for failures that fit no other category.
    #[error("{details}")]
    Unknown {
        /// Error details
        details: String,
    },
}

impl ConfigError {
    /// Classifies an I/O error raised while touching `path`.
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();

        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    /// The sticky status code this error leaves on a store.
    pub fn status(&self) -> ConfigStatus {
        match self {
            Self::Decode { .. } | Self::NotAnObject { .. } => ConfigStatus::DecodeError,
            Self::NotFound { .. } | Self::NotADirectory { .. } => ConfigStatus::FileNotFound,
            Self::PermissionDenied { .. } => ConfigStatus::PermissionError,
            Self::Io { .. } => ConfigStatus::OsError,
            Self::InvalidArgument { .. } | Self::Unknown { .. } => ConfigStatus::UnknownError,
        }
    }
}
