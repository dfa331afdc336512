use std::{
    collections::HashMap,
    fmt, fs,
    path::Path,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config_store::{
    ConfigError, ConfigStore, StoreOptions,
    file_ops::{INSTANCE_NAME_KEY, read_document},
};

/// The process-wide root password: set once, then rotated only with proof.
///
/// Clones share the same secret.
#[derive(Clone, Default)]
pub struct RootPassword(Arc<RwLock<String>>);

impl fmt::Debug for RootPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_set() { "<set>" } else { "<unset>" };
        f.debug_tuple("RootPassword").field(&state).finish()
    }
}

impl RootPassword {
    fn read(&self) -> RwLockReadGuard<'_, String> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, String> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current secret; empty while unset.
    pub fn current(&self) -> String {
        self.read().clone()
    }

    /// Whether a non-empty password has been set.
    pub fn is_set(&self) -> bool {
        !self.read().is_empty()
    }

    /// Whether `presented` equals the current password.
    pub fn matches(&self, presented: &str) -> bool {
        crate::access::root_matches(&self.read(), presented)
    }

    /// Sets the password if none is set yet. Returns whether it was set.
    pub fn set_once(&self, password: &str) -> bool {
        if password.is_empty() {
            return false;
        }

        let mut current = self.write();
        if !current.is_empty() {
            return false;
        }

        *current = password.to_string();
        true
    }

    /// Replaces the password after checking the current one.
    pub fn change(&self, new_password: &str, old_password: &str) -> bool {
        let mut current = self.write();
        if *current != old_password {
            return false;
        }

        *current = new_password.to_string();
        true
    }
}

/// Directory of named [`ConfigStore`]s sharing one [`RootPassword`].
///
/// Cloning is cheap and clones share state. Stores hold the root password but
/// not the registry, so dropping the registry releases every store it owns.
#[derive(Clone, Default)]
pub struct Registry {
    root: RootPassword,
    stores: Arc<RwLock<HashMap<String, ConfigStore>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("root", &self.root)
            .field("instances", &self.instance_names())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry with an unset root password.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_stores(&self) -> RwLockReadGuard<'_, HashMap<String, ConfigStore>> {
        self.stores
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_stores(&self) -> RwLockWriteGuard<'_, HashMap<String, ConfigStore>> {
        self.stores
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The shared root password.
    pub fn root_password(&self) -> &RootPassword {
        &self.root
    }

    /// Sets the root password if it is still unset.
    pub fn set_root_pass(&self, password: &str) -> bool {
        let set = self.root.set_once(password);
        if set {
            info!("Root password set");
        } else {
            debug!("Root password already set, ignoring");
        }
        set
    }

    /// Rotates the root password; `old_password` must match the current one.
    pub fn change_root_pass(&self, new_password: &str, old_password: &str) -> bool {
        let changed = self.root.change(new_password, old_password);
        if changed {
            info!("Root password changed");
        } else {
            warn!("Root password change rejected");
        }
        changed
    }

    /// Opens a store and registers it. See [`ConfigStore::open`].
    ///
    /// # Errors
    /// Propagates every error of [`ConfigStore::open`].
    pub fn open(&self, options: StoreOptions) -> Result<ConfigStore, ConfigError> {
        ConfigStore::open(options, self)
    }

    pub(crate) fn register(&self, store: ConfigStore) {
        let name = store.name();
        let replaced = self.write_stores().insert(name.clone(), store);
        if replaced.is_some() {
            debug!(name, "Replaced registered config store");
        }
    }

    /// The store registered under `name`.
    pub fn get(&self, name: &str) -> Option<ConfigStore> {
        self.read_stores().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn instance_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_stores().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.read_stores().len()
    }

    /// Whether no store is registered.
    pub fn is_empty(&self) -> bool {
        self.read_stores().is_empty()
    }

    /// Moves a store to a new name and records it in its file.
    ///
    /// Fails if `old_name` is unknown or `new_name` is taken by another store.
    pub fn rename(&self, old_name: &str, new_name: &str) -> bool {
        if new_name.is_empty() {
            return false;
        }

        let store = {
            let mut stores = self.write_stores();
            if old_name != new_name && stores.contains_key(new_name) {
                return false;
            }
            let Some(store) = stores.remove(old_name) else {
                return false;
            };
            stores.insert(new_name.to_string(), store.clone());
            store
        };

        store.set_name(new_name);
        info!(from = old_name, to = new_name, "Config store renamed");
        true
    }

    /// Removes a store from the registry without stopping it.
    pub fn unregister(&self, name: &str) -> Option<ConfigStore> {
        self.write_stores().remove(name)
    }

    /// Adopts every JSON object file directly inside `dir`.
    ///
    /// Each store is named after the file's `__config_instance_name__`, or a
    /// random identifier when the file has none. Unreadable or malformed
    /// files are skipped.
    ///
    /// # Errors
    /// * `ConfigError::NotADirectory` - If `dir` is not a directory
    /// * I/O variants - If the directory cannot be listed
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub fn load_dir(&self, dir: &Path, reload_interval: f64) -> Result<usize, ConfigError> {
        if !dir.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: dir.to_path_buf(),
            });
        }

        let entries = fs::read_dir(dir).map_err(|e| ConfigError::from_io(dir, e))?;
        let mut adopted = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let document = match read_document(&path) {
                Ok(document) => document,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable config file");
                    continue;
                }
            };

            let name = document
                .get(INSTANCE_NAME_KEY)
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map_or_else(|| Uuid::new_v4().simple().to_string(), str::to_string);

            let options = StoreOptions::new(name, &path).reload_interval(reload_interval);
            match self.open(options) {
                Ok(_) => adopted += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to adopt config file"),
            }
        }

        info!(adopted, "Config directory loaded");
        Ok(adopted)
    }

    /// Stops every reload loop and empties the registry.
    pub fn shutdown_all(&self) {
        let stores: Vec<ConfigStore> = self.write_stores().drain().map(|(_, s)| s).collect();

        for store in &stores {
            store.shutdown();
        }

        debug!(count = stores.len(), "Registry shut down");
    }
}
