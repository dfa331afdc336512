use std::{
    fmt, fs,
    path::PathBuf,
    sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTime,
};

use futures::Stream;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::{
    access::{self, AccessRequest, Credentials},
    crypto,
    el_command::ElCommand,
    notifier::{ChangeEvent, ChangeNotifier, Handler, HandlerResult},
    registry::{Registry, RootPassword},
};

use super::{
    ChangeSource, ConfigChange, ConfigError, ConfigStatus, GetOptions, SetOptions, StoreOptions,
    ValueKind, WriteOutcome,
    diff::diff_caches,
    file_ops::{self, ACCESS_TOKEN_KEY, INSTANCE_NAME_KEY, PRIVATE_KEY, VERSION, VERSION_KEY},
    options::validate_interval,
    reload::ReloadWorker,
};

struct CacheState {
    cache: Map<String, Value>,
    timestamp: Option<SystemTime>,
    status: ConfigStatus,
    generation: u64,
}

impl CacheState {
    fn is_private(&self) -> bool {
        self.cache
            .get(PRIVATE_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    fn stored_token(&self) -> Option<&str> {
        self.cache.get(ACCESS_TOKEN_KEY).and_then(Value::as_str)
    }
}

pub(crate) struct StoreInner {
    name: RwLock<String>,
    path: RwLock<PathBuf>,
    reload_interval: RwLock<f64>,
    state: RwLock<CacheState>,
    notifier: ChangeNotifier,
    root: RootPassword,
    worker: Mutex<Option<ReloadWorker>>,
}

impl StoreInner {
    pub(super) fn reload_interval(&self) -> f64 {
        *self
            .reload_interval
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_worker(&self) -> Option<ReloadWorker> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(worker) = self.take_worker() {
            worker.stop();
        }
    }
}

/// A JSON file mirrored into memory and kept in sync by a background reload loop.
///
/// Cloning is cheap; clones share the cache, the handlers and the worker.
/// Foreground reads and writes never return errors: failures degrade to the
/// caller's default and leave a sticky [`ConfigStatus`] on the store.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("name", &self.name())
            .field("path", &self.path())
            .field("status", &self.status())
            .finish()
    }
}

impl ConfigStore {
    /// Binds a store to a file, creating the file if it does not exist.
    ///
    /// Performs an initial reload, records the access token, instance name and
    /// version marker in the file, starts the reload loop and registers the
    /// store under its name (replacing any previous holder of that name).
    ///
    /// # Errors
    /// * `ConfigError::InvalidArgument` - If the options are malformed
    /// * I/O variants - If the file or its parent directories cannot be created
    /// * `ConfigError::Unknown` - If the reload thread cannot be started
    #[instrument(skip_all, fields(name = %options.name))]
    pub fn open(options: StoreOptions, registry: &Registry) -> Result<Self, ConfigError> {
        let path = options.resolve_path()?;
        file_ops::ensure_file(&path)?;

        let inner = Arc::new(StoreInner {
            name: RwLock::new(options.name.clone()),
            path: RwLock::new(path),
            reload_interval: RwLock::new(options.reload_interval),
            state: RwLock::new(CacheState {
                cache: Map::new(),
                timestamp: None,
                status: ConfigStatus::Correct,
                generation: 0,
            }),
            notifier: ChangeNotifier::new(),
            root: registry.root_password().clone(),
            worker: Mutex::new(None),
        });

        let store = Self { inner };
        store.reload();

        if store.status().is_correct() {
            store.bootstrap(&options.access_token);
        } else {
            warn!(
                status = %store.status(),
                "Config file unreadable, skipping bootstrap keys"
            );
        }

        let worker = ReloadWorker::spawn(Arc::downgrade(&store.inner))?;
        *store
            .inner
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(worker);

        registry.register(store.clone());
        info!(path = %store.path().display(), "Config store opened");

        Ok(store)
    }

    pub(super) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    fn bootstrap(&self, access_token: &str) {
        let (has_token, has_name, version_current) = {
            let state = self.read_state();
            (
                state.cache.contains_key(ACCESS_TOKEN_KEY),
                state.cache.contains_key(INSTANCE_NAME_KEY),
                state.cache.get(VERSION_KEY).and_then(Value::as_str) == Some(VERSION),
            )
        };

        if !has_token {
            self.apply(ACCESS_TOKEN_KEY, Some(Value::from(access_token)), ChangeSource::Write);
        }
        if !has_name {
            self.apply(INSTANCE_NAME_KEY, Some(Value::from(self.name())), ChangeSource::Write);
        }
        if !version_current {
            self.apply(VERSION_KEY, Some(Value::from(VERSION)), ChangeSource::Write);
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registry name of this store.
    pub fn name(&self) -> String {
        self.inner
            .name
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self
            .inner
            .name
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = name.to_string();

        self.apply(INSTANCE_NAME_KEY, Some(Value::from(name)), ChangeSource::Write);
    }

    /// Path of the bound file.
    pub fn path(&self) -> PathBuf {
        self.inner
            .path
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Sticky health code left by the last reload or failed write.
    pub fn status(&self) -> ConfigStatus {
        self.read_state().status
    }

    /// Seconds between reload polls.
    pub fn reload_interval(&self) -> f64 {
        self.inner.reload_interval()
    }

    /// Number of keys in the cache, reserved keys included.
    pub fn len(&self) -> usize {
        self.read_state().cache.len()
    }

    /// Whether the cache holds no keys at all.
    pub fn is_empty(&self) -> bool {
        self.read_state().cache.is_empty()
    }

    /// Whether the whole file is private. Missing or non-boolean flags count as private.
    pub fn is_private(&self) -> bool {
        self.read_state().is_private()
    }

    /// Changes the poll interval and wakes the reload loop.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidArgument` for NaN or infinite intervals.
    pub fn set_reload_interval(&self, seconds: f64) -> Result<(), ConfigError> {
        validate_interval(seconds)?;
        self.store_interval(seconds);
        Ok(())
    }

    /// Disables periodic reload; the loop keeps idling until shutdown.
    pub fn stop_auto_reload(&self) {
        self.store_interval(-1.0);
    }

    fn store_interval(&self, seconds: f64) {
        *self
            .inner
            .reload_interval
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = seconds;

        if let Some(worker) = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            worker.wake();
        }
    }

    /// Stops the reload loop. Manual [`ConfigStore::reload`] keeps working.
    pub fn shutdown(&self) {
        if let Some(worker) = self.inner.take_worker() {
            worker.stop();
            debug!(name = %self.name(), "Reload loop shut down");
        }
    }

    /// Rebinds the store to another file and reloads from it.
    ///
    /// The file and its parent directories are created if missing.
    ///
    /// # Errors
    /// Returns the classified I/O error if the new file cannot be created.
    pub fn change_config_file_path(&self, path: impl Into<PathBuf>) -> Result<(), ConfigError> {
        let path = path.into();
        file_ops::ensure_file(&path)?;

        *self
            .inner
            .path
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = path;

        {
            let mut state = self.write_state();
            state.timestamp = None;
            state.generation += 1;
        }

        self.reload();
        Ok(())
    }

    /// Re-reads the file if its modification time moved, then fires handlers
    /// for every key whose value changed. Added and removed keys only reach
    /// stream subscribers.
    ///
    /// Failures only update [`ConfigStore::status`]; the cache stays as it was.
    pub fn reload(&self) {
        let path = self.path();
        let (seen, generation) = {
            let state = self.read_state();
            (state.timestamp, state.generation)
        };

        let loaded = file_ops::modified_time(&path).and_then(|modified| {
            if seen == Some(modified) {
                return Ok(None);
            }
            file_ops::read_document(&path).map(|document| Some((modified, document)))
        });

        let changes = match loaded {
            Ok(None) => {
                self.mark_correct();
                return;
            }
            Ok(Some((modified, document))) => {
                let mut state = self.write_state();
                if state.generation != generation {
                    debug!("Discarding reload that raced a foreground write");
                    return;
                }

                let old = std::mem::replace(&mut state.cache, document);
                let changes = diff_caches(&old, &state.cache, ChangeSource::Reload);
                state.timestamp = Some(modified);
                if !state.status.is_correct() {
                    info!(previous = %state.status, "Config file readable again");
                }
                state.status = ConfigStatus::Correct;
                changes
            }
            Err(e) => {
                self.record_failure(&e);
                return;
            }
        };

        if !changes.is_empty() {
            debug!(changed = changes.len(), "Config file reloaded");
            self.inner.notifier.dispatch(changes);
        }
    }

    fn mark_correct(&self) {
        let mut state = self.write_state();
        if !state.status.is_correct() {
            info!(previous = %state.status, "Config file readable again");
            state.status = ConfigStatus::Correct;
        }
    }

    fn record_failure(&self, error: &ConfigError) {
        let status = error.status();
        let previous = std::mem::replace(&mut self.write_state().status, status);

        if previous == status {
            debug!(%status, error = %error, "Config reload still failing");
        } else {
            warn!(%status, error = %error, "Config reload failed");
        }
    }

    fn allowed(&self, key: &str, credentials: &Credentials) -> bool {
        let root_password = self.inner.root.current();
        let state = self.read_state();

        access::is_allowed(&AccessRequest {
            key,
            credentials,
            file_private: state.is_private(),
            stored_token: state.stored_token(),
            root_password: &root_password,
        })
    }

    fn has_proof(&self, credentials: &Credentials) -> bool {
        let root_password = self.inner.root.current();
        let state = self.read_state();
        access::has_proof(credentials, state.stored_token(), &root_password)
    }

    fn cached(&self, key: &str) -> Option<Value> {
        self.read_state().cache.get(key).cloned()
    }

    /// Reads a key, degrading to `options.default` when it is forbidden,
    /// absent or of the wrong kind.
    ///
    /// An absent key has the default persisted under it when
    /// `options.save_unknown` is set. With `options.allow_command`, the
    /// `[el]#moca_get_all_config#` command yields the [`ConfigStore::get_all`]
    /// view, so callers without proof never see `_` keys.
    pub fn get(&self, key: &str, options: &GetOptions) -> Value {
        self.lookup(key, options)
            .unwrap_or_else(|| options.default.clone())
    }

    fn lookup(&self, key: &str, options: &GetOptions) -> Option<Value> {
        if !self.allowed(key, &options.credentials) {
            debug!(key, "Read denied");
            return None;
        }

        let raw = if options.allow_command {
            match ElCommand::parse(key) {
                Some(ElCommand::GetAllConfig) => {
                    self.get_all(&options.credentials).map(Value::Object)
                }
                Some(command) => command.evaluate(),
                None => self.cached(key),
            }
        } else {
            self.cached(key)
        };

        let Some(raw) = raw else {
            if options.save_unknown {
                let set_options = SetOptions::new().credentials(options.credentials.clone());
                self.set(key, options.default.clone(), &set_options);
            }
            return None;
        };

        options.kind.resolve(raw, options.auto_convert)
    }

    /// Whether `key` currently resolves to `expected`. Never persists anything.
    pub fn check(
        &self,
        key: &str,
        kind: ValueKind,
        expected: &Value,
        credentials: &Credentials,
    ) -> bool {
        let options = GetOptions::new()
            .kind(kind)
            .save_unknown(false)
            .credentials(credentials.clone());

        self.lookup(key, &options).as_ref() == Some(expected)
    }

    /// Writes a key to the cache and the file.
    ///
    /// On a failed write the cache entry is rolled back. Handlers watching
    /// the key fire whenever it replaced an existing value, equal or not.
    pub fn set(&self, key: &str, value: Value, options: &SetOptions) -> WriteOutcome {
        if !self.allowed(key, &options.credentials) {
            debug!(key, "Write denied");
            return WriteOutcome::Denied;
        }

        let expanded = match &value {
            Value::String(text) if options.allow_command => crate::el_command::expand(text),
            _ => None,
        };

        self.apply(key, Some(expanded.unwrap_or(value)), ChangeSource::Write)
    }

    /// Deletes a key from the cache and the file.
    ///
    /// Returns [`WriteOutcome::Missing`] without touching the file if the key is absent.
    /// Handlers are not called; stream subscribers still see the removal.
    pub fn remove(&self, key: &str, credentials: &Credentials) -> WriteOutcome {
        if !self.allowed(key, credentials) {
            debug!(key, "Remove denied");
            return WriteOutcome::Denied;
        }

        self.apply(key, None, ChangeSource::Remove)
    }

    fn apply(&self, key: &str, value: Option<Value>, source: ChangeSource) -> WriteOutcome {
        let path = self.path();

        let old = {
            let mut state = self.write_state();

            let old = match &value {
                Some(value) => state.cache.insert(key.to_string(), value.clone()),
                None => state.cache.remove(key),
            };

            if value.is_none() && old.is_none() {
                return WriteOutcome::Missing;
            }

            if let Err(e) = file_ops::write_document(&path, &state.cache) {
                match &old {
                    Some(old) => state.cache.insert(key.to_string(), old.clone()),
                    None => state.cache.remove(key),
                };
                state.status = e.status();
                warn!(key, error = %e, "Failed to persist config, rolled back");
                return WriteOutcome::Failed;
            }

            state.generation += 1;
            old
        };

        self.inner
            .notifier
            .notify_single(key, old.as_ref(), value.as_ref(), source);

        WriteOutcome::Applied
    }

    /// Snapshot of the cache as the credentials may see it.
    ///
    /// A private file yields `None` without proof. A public file yields every
    /// key with proof, otherwise only keys not starting with `_`.
    pub fn get_all(&self, credentials: &Credentials) -> Option<Map<String, Value>> {
        let proof = self.has_proof(credentials);
        let state = self.read_state();

        if proof {
            return Some(state.cache.clone());
        }
        if state.is_private() {
            return None;
        }

        Some(
            state
                .cache
                .iter()
                .filter(|(key, _)| !access::is_private_key(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Keys visible to the credentials, under the rules of [`ConfigStore::get_all`].
    pub fn keys(&self, credentials: &Credentials) -> Option<Vec<String>> {
        self.get_all(credentials)
            .map(|entries| entries.into_iter().map(|(key, _)| key).collect())
    }

    /// Marks the whole file private. Always permitted.
    pub fn set_private(&self) -> WriteOutcome {
        self.apply(PRIVATE_KEY, Some(Value::Bool(true)), ChangeSource::Write)
    }

    /// Marks the file public; needs root or token proof.
    pub fn set_public(&self, credentials: &Credentials) -> WriteOutcome {
        let options = SetOptions::new().credentials(credentials.clone());
        self.set(PRIVATE_KEY, Value::Bool(false), &options)
    }

    /// Replaces the file's access token after checking the root password.
    pub fn set_access_token(&self, token: &str, root_pass: &str) -> WriteOutcome {
        if !self.inner.root.matches(root_pass) {
            debug!("Access token change denied");
            return WriteOutcome::Denied;
        }

        self.apply(ACCESS_TOKEN_KEY, Some(Value::from(token)), ChangeSource::Write)
    }

    /// Verifies a token against the stored one; needs the root password.
    ///
    /// See [`access::check_access_token`] for the meaning of the result.
    pub fn check_access_token(&self, token: &str, root_pass: &str) -> Option<bool> {
        let root_password = self.inner.root.current();
        let state = self.read_state();
        access::check_access_token(state.stored_token(), token, &root_password, root_pass)
    }

    /// Deletes the bound file after root or token proof. The store itself survives.
    pub fn delete_file(&self, credentials: &Credentials) -> bool {
        if !self.has_proof(credentials) {
            debug!("Config file deletion denied");
            return false;
        }

        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Config file deleted");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete config file");
                false
            }
        }
    }

    /// Stores `value` as JSON text encrypted under `password`.
    pub fn set_encrypted(
        &self,
        key: &str,
        value: &Value,
        password: &str,
        credentials: &Credentials,
    ) -> WriteOutcome {
        let plain = match serde_json::to_string(value) {
            Ok(plain) => plain,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize value for encryption");
                return WriteOutcome::Failed;
            }
        };

        let sealed = Value::from(crypto::encrypt_string(&plain, password));
        self.set(key, sealed, &SetOptions::new().credentials(credentials.clone()))
    }

    /// Reads a value stored by [`ConfigStore::set_encrypted`].
    ///
    /// A wrong password, a non-string value or undecodable plaintext all yield
    /// `options.default`. Absent keys are never persisted.
    pub fn get_encrypted(&self, key: &str, password: &str, options: &GetOptions) -> Value {
        let raw_options = GetOptions::new()
            .save_unknown(false)
            .credentials(options.credentials.clone());

        let Some(Value::String(sealed)) = self.lookup(key, &raw_options) else {
            return options.default.clone();
        };

        crypto::decrypt_string(&sealed, password)
            .ok()
            .and_then(|plain| serde_json::from_str::<Value>(&plain).ok())
            .and_then(|value| options.kind.resolve(value, options.auto_convert))
            .unwrap_or_else(|| options.default.clone())
    }

    /// Registers a named handler for the given keys, replacing any handler of that name.
    pub fn add_handler<K, F>(&self, name: &str, keys: K, context: Value, callback: F)
    where
        K: IntoIterator,
        K::Item: Into<String>,
        F: Fn(&ChangeEvent<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.notifier.add_handler(name, keys, context, callback);
    }

    /// Removes a handler. Returns whether it existed.
    pub fn remove_handler(&self, name: &str) -> bool {
        self.inner.notifier.remove_handler(name)
    }

    /// The callback registered under `name`.
    pub fn get_handler(&self, name: &str) -> Option<Handler> {
        self.inner.notifier.get_handler(name)
    }

    /// Names of all registered handlers, sorted.
    pub fn handler_names(&self) -> Vec<String> {
        self.inner.notifier.handler_names()
    }

    /// Creates a stream that yields changes whose key matches `pattern`
    ///
    /// # Arguments
    /// * `pattern` - A dot-separated key pattern (supports "*" wildcards)
    pub fn subscribe(&self, pattern: &str) -> impl Stream<Item = ConfigChange> + use<> {
        self.inner.notifier.subscribe(pattern)
    }
}
