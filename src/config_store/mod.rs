//! File-backed JSON configuration store with a background reload loop.
//!
//! A [`ConfigStore`] mirrors one JSON object file into memory, persists every
//! foreground write back to it, and polls the file so external edits reach the
//! cache and the registered change handlers within one reload interval.

mod changes;
mod convert;
pub(crate) mod diff;
pub mod file_ops;
mod options;
pub(crate) mod path_ops;
mod reload;
mod store;

#[cfg(test)]
mod tests;

pub use changes::{ChangeSource, ConfigChange, ConfigError, ConfigStatus};
pub use convert::ValueKind;
pub use options::{GetOptions, SetOptions, StoreOptions, WriteOutcome};
pub use reload::IDLE_POLL;
pub use store::ConfigStore;
