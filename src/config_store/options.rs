use std::{fmt, path::PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::access::Credentials;

use super::{ConfigError, ValueKind};

/// Construction parameters for a [`super::ConfigStore`].
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Registry key of the instance.
    pub name: String,
    /// Config file path, or its directory when `filename` is set.
    pub path: PathBuf,
    /// File name joined onto `path`.
    pub filename: Option<String>,
    /// Seconds between reload polls; `<= 0` disables periodic reload.
    pub reload_interval: f64,
    /// Access token stored in a file that has none yet.
    pub access_token: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: PathBuf::new(),
            filename: None,
            reload_interval: 1.0,
            access_token: String::new(),
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("filename", &self.filename)
            .field("reload_interval", &self.reload_interval)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl StoreOptions {
    /// Options for an instance `name` bound to `path`.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Joins `filename` onto the path.
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets the reload interval in seconds.
    pub fn reload_interval(mut self, seconds: f64) -> Self {
        self.reload_interval = seconds;
        self
    }

    /// Sets the initial access token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = token.into();
        self
    }

    /// Validates the options and returns the resolved file path.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidArgument` for an empty name or path, a
    /// filename with directory components, or a non-finite interval.
    pub fn resolve_path(&self) -> Result<PathBuf, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidArgument {
                field: "name",
                reason: "instance name must not be empty".to_string(),
            });
        }

        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidArgument {
                field: "path",
                reason: "config path must not be empty".to_string(),
            });
        }

        validate_interval(self.reload_interval)?;

        match self.filename.as_deref() {
            None | Some("") => Ok(self.path.clone()),
            Some(name) if name.contains(['/', '\\']) => Err(ConfigError::InvalidArgument {
                field: "filename",
                reason: format!("'{name}' must be a bare file name"),
            }),
            Some(name) => Ok(self.path.join(name)),
        }
    }
}

/// Rejects reload intervals the poll loop cannot sleep on.
///
/// # Errors
/// Returns `ConfigError::InvalidArgument` for NaN or infinite values.
pub(super) fn validate_interval(seconds: f64) -> Result<(), ConfigError> {
    if seconds.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidArgument {
            field: "reload_interval",
            reason: format!("{seconds} is not a finite number of seconds"),
        })
    }
}

/// Per-call parameters of [`super::ConfigStore::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct GetOptions {
    /// Expected shape of the value.
    pub kind: ValueKind,
    /// Returned when the value is absent, forbidden, or of the wrong shape.
    pub default: Value,
    /// Try to convert a value of the wrong shape.
    pub auto_convert: bool,
    /// Resolve el-command keys to live values.
    pub allow_command: bool,
    /// Persist `default` under an absent key.
    pub save_unknown: bool,
    /// Proof presented with the read.
    pub credentials: Credentials,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            kind: ValueKind::Any,
            default: Value::Null,
            auto_convert: false,
            allow_command: false,
            save_unknown: true,
            credentials: Credentials::none(),
        }
    }
}

impl GetOptions {
    /// Default options: any kind, null default, unknown keys saved.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expected kind.
    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the fallback value.
    pub fn default_value(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Enables or disables conversion.
    pub fn auto_convert(mut self, enabled: bool) -> Self {
        self.auto_convert = enabled;
        self
    }

    /// Enables or disables el-command resolution.
    pub fn allow_command(mut self, enabled: bool) -> Self {
        self.allow_command = enabled;
        self
    }

    /// Enables or disables persisting the default for absent keys.
    pub fn save_unknown(mut self, enabled: bool) -> Self {
        self.save_unknown = enabled;
        self
    }

    /// Sets the presented credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Per-call parameters of [`super::ConfigStore::set`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOptions {
    /// Expand an el-command value before storing it.
    pub allow_command: bool,
    /// Proof presented with the write.
    pub credentials: Credentials,
}

impl SetOptions {
    /// No expansion, no credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables el-command expansion.
    pub fn allow_command(mut self, enabled: bool) -> Self {
        self.allow_command = enabled;
        self
    }

    /// Sets the presented credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Outcome of a foreground write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOutcome {
    /// The cache and the file were updated.
    Applied,
    /// `remove` found no such key; nothing was touched.
    Missing,
    /// Persisting failed and the cache was rolled back.
    Failed,
    /// Access control refused the write.
    Denied,
}

impl WriteOutcome {
    /// Whether the write took effect.
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }

    /// Tri-state view: `Some(true)` applied, `Some(false)` failed or missing, `None` denied.
    pub fn as_option(self) -> Option<bool> {
        match self {
            Self::Applied => Some(true),
            Self::Missing | Self::Failed => Some(false),
            Self::Denied => None,
        }
    }
}
