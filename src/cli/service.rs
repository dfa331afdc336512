use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    access::Credentials,
    config_store::{ConfigStore, GetOptions, SetOptions, StoreOptions, WriteOutcome},
    el_command,
    registry::Registry,
};

use super::{
    CliError, CommandResult,
    args::{Cli, Commands},
    formatting::{format_change, format_header, format_value, parse_value},
};

/// Executes parsed commands against one store.
///
/// The store is opened on first use, so commands that need no file
/// (`expand`, `load-dir`) never create one.
pub struct CliService {
    registry: Registry,
    options: StoreOptions,
    credentials: Credentials,
}

impl CliService {
    /// Creates a service for the file and credentials named on the command line.
    ///
    /// A `--root-pass` becomes the process root password.
    pub fn new(cli: &Cli) -> Self {
        let registry = Registry::new();
        let root_pass = cli.root_pass.clone().unwrap_or_default();
        if !root_pass.is_empty() {
            registry.set_root_pass(&root_pass);
        }

        let options = StoreOptions::new(cli.name.clone(), cli.file.clone())
            .reload_interval(cli.interval);

        Self {
            registry,
            options,
            credentials: Credentials::new(cli.token.clone().unwrap_or_default(), root_pass),
        }
    }

    /// The registry backing this service.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn store(&self) -> Result<ConfigStore, CliError> {
        if let Some(store) = self.registry.get(&self.options.name) {
            return Ok(store);
        }

        Ok(self.registry.open(self.options.clone())?)
    }

    /// Runs a one-shot command and returns the text to print.
    ///
    /// # Errors
    /// Returns `CliError` when the store cannot be opened, access is denied,
    /// a key is missing, or a write cannot be persisted.
    pub fn execute(&self, command: &Commands) -> CommandResult {
        match command {
            Commands::Get {
                key,
                kind,
                default,
                convert,
                command,
                no_save,
            } => {
                let options = GetOptions::new()
                    .kind(*kind)
                    .default_value(default.as_deref().map_or(Value::Null, parse_value))
                    .auto_convert(*convert)
                    .allow_command(*command)
                    .save_unknown(!no_save)
                    .credentials(self.credentials.clone());

                Ok(format_value(&self.store()?.get(key, &options)))
            }

            Commands::Set {
                key,
                value,
                command,
            } => {
                let store = self.store()?;
                let options = SetOptions::new()
                    .allow_command(*command)
                    .credentials(self.credentials.clone());

                let outcome = store.set(key, parse_value(value), &options);
                written(&store, key, outcome)
            }

            Commands::Remove { key } => {
                let store = self.store()?;
                let outcome = store.remove(key, &self.credentials);
                written(&store, key, outcome)
            }

            Commands::Check {
                key,
                expected,
                kind,
            } => {
                let store = self.store()?;
                if store.check(key, *kind, &parse_value(expected), &self.credentials) {
                    Ok("true".to_string())
                } else {
                    Err(CliError::InvalidArguments(format!(
                        "'{key}' does not hold {expected}"
                    )))
                }
            }

            Commands::Keys => {
                let store = self.store()?;
                let keys = store
                    .keys(&self.credentials)
                    .ok_or_else(|| CliError::Denied(store.name()))?;

                Ok(keys.join("\n"))
            }

            Commands::SetEncrypted {
                key,
                value,
                password,
            } => {
                let store = self.store()?;
                let outcome =
                    store.set_encrypted(key, &parse_value(value), password, &self.credentials);
                written(&store, key, outcome)
            }

            Commands::GetEncrypted {
                key,
                password,
                default,
            } => {
                let options = GetOptions::new()
                    .default_value(default.as_deref().map_or(Value::Null, parse_value))
                    .credentials(self.credentials.clone());

                Ok(format_value(&self.store()?.get_encrypted(key, password, &options)))
            }

            Commands::Expand { command } => el_command::expand(command)
                .map(|value| format_value(&value))
                .ok_or_else(|| {
                    CliError::InvalidArguments(format!("'{command}' is not an el-command"))
                }),

            Commands::LoadDir { dir } => {
                let adopted = self.registry.load_dir(dir, self.options.reload_interval)?;
                let mut lines = vec![format_header(&format!("Loaded {adopted} config file(s)"))];
                lines.extend(self.registry.instance_names());
                Ok(lines.join("\n"))
            }

            Commands::Watch { .. } => Err(CliError::InvalidArguments(
                "'watch' runs through CliService::watch".to_string(),
            )),
        }
    }

    /// Prints changes to keys matching `pattern` until Ctrl+C.
    ///
    /// # Errors
    /// Returns `CliError::ConfigError` if the store cannot be opened.
    pub async fn watch(&self, pattern: &str) -> CommandResult {
        let store = self.store()?;
        if store.reload_interval() <= 0.0 {
            warn!("Reloading is disabled, only this process's writes will show up");
        }

        println!("Watching '{pattern}' in {}", store.path().display());
        println!("Press Ctrl+C to stop");

        let changes = store.subscribe(pattern);
        tokio::pin!(changes);

        loop {
            tokio::select! {
                change = changes.next() => match change {
                    Some(change) => println!("{}", format_change(&change)),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    debug!("Interrupted");
                    break;
                }
            }
        }

        Ok("Watch ended".to_string())
    }

    /// Stops every reload loop the service started.
    pub fn shutdown(&self) {
        self.registry.shutdown_all();
    }
}

fn written(store: &ConfigStore, key: &str, outcome: WriteOutcome) -> CommandResult {
    match outcome {
        WriteOutcome::Applied => Ok("ok".to_string()),
        WriteOutcome::Missing => Err(CliError::NotFound(key.to_string())),
        WriteOutcome::Denied => Err(CliError::Denied(key.to_string())),
        WriteOutcome::Failed => Err(CliError::WriteFailed {
            key: key.to_string(),
            status: store.status(),
        }),
    }
}
