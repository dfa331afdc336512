use std::{fs, path::Path, time::SystemTime};

use serde::Serialize;
use serde_json::{Map, Value, ser::PrettyFormatter};
use tracing::debug;

use super::ConfigError;

/// Version marker written into every bound file.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Key of the whole-file privacy flag.
pub const PRIVATE_KEY: &str = "__private__";
/// Key of the per-file bearer token.
pub const ACCESS_TOKEN_KEY: &str = "__moca_config_access_token__";
/// Key recording the instance name a file was bound under.
pub const INSTANCE_NAME_KEY: &str = "__config_instance_name__";
/// Key of the version marker.
pub const VERSION_KEY: &str = "__MocaConfig_version__";
/// Key of the welcome marker in freshly created files.
pub const WELCOME_KEY: &str = "__MocaConfig__";

const WELCOME_MESSAGE: &str = "Welcome to MocaConfig, the config module is now available.";

/// The document written to a path that has no file yet.
pub fn bootstrap_document() -> Map<String, Value> {
    let mut document = Map::new();
    document.insert(WELCOME_KEY.to_string(), Value::from(WELCOME_MESSAGE));
    document.insert(VERSION_KEY.to_string(), Value::from(VERSION));
    document.insert(PRIVATE_KEY.to_string(), Value::Bool(false));
    document
}

/// Creates the parent directories and the bootstrap file if `path` is not a file yet.
///
/// # Errors
/// Returns the classified I/O error if the directory or file cannot be created.
pub(super) fn ensure_file(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ConfigError::from_io(parent, e))?;
    }

    if !path.is_file() {
        debug!("Creating config file {}", path.display());
        write_document(path, &bootstrap_document())?;
    }

    Ok(())
}

/// Last-modified time of the file, the cache's staleness detector.
///
/// # Errors
/// Returns the classified I/O error if the file cannot be stat'ed.
pub(super) fn modified_time(path: &Path) -> Result<SystemTime, ConfigError> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| ConfigError::from_io(path, e))
}

/// Reads and parses the file as a JSON object.
///
/// # Errors
/// * `ConfigError::Decode` - If the contents are not JSON
/// * `ConfigError::NotAnObject` - If the JSON is not an object
/// * I/O variants - If the file cannot be read
pub fn read_document(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::from_io(path, e))?;

    let value: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Object(document) => Ok(document),
        _ => Err(ConfigError::NotAnObject {
            path: path.to_path_buf(),
        }),
    }
}

/// Renders the document the way it is stored: 4-space indent, sorted keys.
///
/// # Errors
/// Returns `ConfigError::Unknown` if serialization fails.
pub(super) fn render_document(document: &Map<String, Value>) -> Result<String, ConfigError> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));

    document
        .serialize(&mut serializer)
        .map_err(|e| ConfigError::Unknown {
            details: format!("failed to serialize config: {e}"),
        })?;

    String::from_utf8(buf).map_err(|e| ConfigError::Unknown {
        details: format!("serialized config is not UTF-8: {e}"),
    })
}

/// Persists the whole document with a plain truncate-and-write.
///
/// # Errors
/// Returns the classified I/O error if the file cannot be written.
pub(super) fn write_document(path: &Path, document: &Map<String, Value>) -> Result<(), ConfigError> {
    let json = render_document(document)?;
    fs::write(path, json).map_err(|e| ConfigError::from_io(path, e))
}
