//! MocaConfig - file-backed JSON configuration for long-running processes.
//!
//! Each [`ConfigStore`] mirrors one JSON object file into memory and keeps
//! it in sync from both directions:
//!
//! - Foreground writes persist immediately and roll back if the disk refuses them
//! - A background loop notices external edits and fires named change handlers
//! - Private files and `_` keys need the root password or the file's access token
//! - Reserved el-command strings resolve to live values such as UUIDs and timestamps
//! - Secrets can be stored encrypted under a password
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use moca_config::{GetOptions, Registry, SetOptions, StoreOptions, ValueKind};
//! use serde_json::json;
//!
//! let registry = Registry::new();
//! registry.set_root_pass("root-secret");
//!
//! let store = registry.open(StoreOptions::new("app", "/tmp/app.json"))?;
//! store.set("port", json!(8080), &SetOptions::new());
//!
//! let port = store.get("port", &GetOptions::new().kind(ValueKind::Int));
//! println!("port = {port}");
//! # Ok::<(), moca_config::ConfigError>(())
//! ```

/// Permission rules for private files and keys.
pub mod access;

/// Command-line interface for inspecting and editing config files.
pub mod cli;

/// The file-backed store and its reload loop.
pub mod config_store;

/// Password-based encryption of stored secrets.
pub mod crypto;

/// Reserved sentinel strings that resolve to live values.
pub mod el_command;

/// Named change handlers and change streams.
pub mod notifier;

/// Process-wide directory of stores and the root password.
pub mod registry;

/// Logging setup for the binary.
pub mod tracing_config;

pub use access::Credentials;
pub use config_store::{
    ChangeSource, ConfigChange, ConfigError, ConfigStatus, ConfigStore, GetOptions, SetOptions,
    StoreOptions, ValueKind, WriteOutcome,
};
pub use notifier::{ChangeEvent, HandlerError, HandlerResult};
pub use registry::{Registry, RootPassword};
