use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::config_store::ValueKind;

/// Inspect and edit a MocaConfig JSON file.
#[derive(Parser, Debug)]
#[command(name = "moca-config", version, about, long_about = None)]
pub struct Cli {
    /// Path of the config file; created if missing.
    #[arg(short, long, default_value = "moca_config.json", env = "MOCA_CONFIG_FILE", global = true)]
    pub file: PathBuf,

    /// Instance name the file is registered under.
    #[arg(short, long, default_value = "main", global = true)]
    pub name: String,

    /// Process root password, set once at startup.
    #[arg(long, env = "MOCA_ROOT_PASS", hide_env_values = true, global = true)]
    pub root_pass: Option<String>,

    /// Access token presented with every request.
    #[arg(long, env = "MOCA_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Seconds between reload polls; 0 or less disables reloading.
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true, global = true)]
    pub interval: f64,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the value of a key.
    Get {
        /// Key to read, or an el-command with --command.
        key: String,
        /// Expected kind of the value.
        #[arg(short, long, default_value_t = ValueKind::Any)]
        kind: ValueKind,
        /// Printed (and saved, unless --no-save) when the key is absent.
        #[arg(short, long)]
        default: Option<String>,
        /// Convert a value of the wrong kind.
        #[arg(long)]
        convert: bool,
        /// Resolve el-commands such as [el]#moca_uuid4#.
        #[arg(long)]
        command: bool,
        /// Do not persist the default for an absent key.
        #[arg(long)]
        no_save: bool,
    },

    /// Write a value; it is parsed as JSON when possible.
    Set {
        /// Key to write.
        key: String,
        /// Value to store.
        value: String,
        /// Expand an el-command value before storing it.
        #[arg(long)]
        command: bool,
    },

    /// Delete a key.
    Remove {
        /// Key to delete.
        key: String,
    },

    /// Exit with an error unless a key holds the expected value.
    Check {
        /// Key to compare.
        key: String,
        /// Expected value, parsed as JSON when possible.
        expected: String,
        /// Kind to resolve the stored value as.
        #[arg(short, long, default_value_t = ValueKind::Any)]
        kind: ValueKind,
    },

    /// List visible keys.
    Keys,

    /// Encrypt a value under a password and store it.
    #[command(name = "set-encrypted")]
    SetEncrypted {
        /// Key to write.
        key: String,
        /// Value to encrypt, parsed as JSON when possible.
        value: String,
        /// Encryption password.
        #[arg(short, long, env = "MOCA_SECRET", hide_env_values = true)]
        password: String,
    },

    /// Decrypt and print a value stored with set-encrypted.
    #[command(name = "get-encrypted")]
    GetEncrypted {
        /// Key to read.
        key: String,
        /// Decryption password.
        #[arg(short, long, env = "MOCA_SECRET", hide_env_values = true)]
        password: String,
        /// Printed when the key is absent or the password is wrong.
        #[arg(short, long)]
        default: Option<String>,
    },

    /// Evaluate an el-command without touching any file.
    Expand {
        /// The el-command, e.g. [el]#moca_random_string<8>#.
        command: String,
    },

    /// Register every JSON file in a directory.
    #[command(name = "load-dir")]
    LoadDir {
        /// Directory to scan.
        dir: PathBuf,
    },

    /// Stream changes to matching keys until Ctrl+C.
    Watch {
        /// Key pattern; `*` matches one segment, a trailing `*` everything below.
        #[arg(default_value = "*")]
        pattern: String,
    },
}
