//! Command-line interface for inspecting and editing config files.
//!
//! Arguments are parsed with `clap`; [`CliService`] runs the parsed command
//! against a store opened from the `--file` flag.

mod args;
pub mod formatting;
mod service;
mod types;

#[cfg(test)]
mod tests;

pub use args::{Cli, Commands};
pub use service::CliService;
pub use types::{CliError, CommandResult};
