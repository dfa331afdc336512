//! Formatting utilities for CLI output.

use serde_json::Value;

use crate::config_store::{ChangeSource, ConfigChange};

/// ANSI color codes for terminal output
pub struct Colors;

impl Colors {
    /// Reset all formatting
    pub const RESET: &'static str = "\x1b[0m";
    /// Bold text
    pub const BOLD: &'static str = "\x1b[1m";
    /// Dim text
    pub const DIM: &'static str = "\x1b[2m";
    /// Red color
    pub const RED: &'static str = "\x1b[31m";
    /// Green color
    pub const GREEN: &'static str = "\x1b[32m";
    /// Cyan color
    pub const CYAN: &'static str = "\x1b[36m";
}

/// Formats section headers with styling
pub fn format_header(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::CYAN, text, Colors::RESET)
}

/// Formats key names with styling
pub fn format_key(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::GREEN, text, Colors::RESET)
}

/// Formats descriptions with muted styling
pub fn format_description(text: &str) -> String {
    format!("{}{}{}", Colors::DIM, text, Colors::RESET)
}

/// Formats error messages with red styling
pub fn format_error(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::RED, text, Colors::RESET)
}

/// Formats a JSON value for human-readable CLI output.
///
/// Scalars print the way JSON writes them; arrays and objects print
/// indented so nested settings stay readable.
///
/// # Examples
///
/// ```
/// use moca_config::cli::formatting::format_value;
/// use serde_json::json;
///
/// assert_eq!(format_value(&json!("hello")), "\"hello\"");
/// assert_eq!(format_value(&json!(42)), "42");
/// ```
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        scalar => scalar.to_string(),
    }
}

/// Parses a command-line value as JSON, falling back to a plain string.
///
/// `42` becomes a number and `"42"` a string; `hello` needs no quotes.
pub fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// One-line summary of a change for `watch` output.
pub fn format_change(change: &ConfigChange) -> String {
    let render = |value: &Option<Value>| match value {
        Some(value) => value.to_string(),
        None => "<absent>".to_string(),
    };

    let source = match change.source {
        ChangeSource::Reload => "reload",
        ChangeSource::Write => "write",
        ChangeSource::Remove => "remove",
    };

    format!(
        "{}: {} -> {} {}",
        format_key(&change.key),
        render(&change.old_value),
        render(&change.new_value),
        format_description(&format!("({source})"))
    )
}
