//! Named change handlers plus pattern-filtered change streams.
//!
//! Handlers are registered under a unique name with the keys they watch; a
//! reverse index maps each key to the names watching it. Every dispatched
//! change is also broadcast to stream subscribers.

use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use futures::Stream;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::config_store::{ChangeSource, ConfigChange, diff::diff_caches, path_ops::path_matches};

/// What a handler returns when it cannot process a change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Logged and ignored; remaining handlers still run.
    #[error("handler failed: {0}")]
    Failed(String),

    /// Deliberate process termination with the given exit code.
    #[error("handler requested exit with code {0}")]
    Exit(i32),
}

/// Result type of a change handler.
pub type HandlerResult = Result<(), HandlerError>;

/// Invocation record passed to a handler.
#[derive(Debug, Clone, Copy)]
pub struct ChangeEvent<'a> {
    /// Name the handler was registered under.
    pub handler: &'a str,
    /// The key that changed.
    pub key: &'a str,
    /// Value before the change, if the key existed.
    pub old_value: Option<&'a Value>,
    /// Value after the change, if the key still exists.
    pub new_value: Option<&'a Value>,
    /// Context payload supplied at registration.
    pub context: &'a Value,
    /// What caused the change.
    pub source: &'a ChangeSource,
}

/// A registered change callback.
pub type Handler = Arc<dyn Fn(&ChangeEvent<'_>) -> HandlerResult + Send + Sync>;

struct HandlerEntry {
    keys: Vec<String>,
    callback: Handler,
    context: Value,
}

#[derive(Default)]
struct HandlerTable {
    handlers: HashMap<String, HandlerEntry>,
    watched: HashMap<String, Vec<String>>,
}

impl HandlerTable {
    fn unlink(&mut self, name: &str) -> Option<HandlerEntry> {
        let entry = self.handlers.remove(name)?;
        for key in &entry.keys {
            if let Some(names) = self.watched.get_mut(key) {
                names.retain(|n| n != name);
                if names.is_empty() {
                    self.watched.remove(key);
                }
            }
        }
        Some(entry)
    }
}

/// Per-store registry of change handlers and change streams.
pub struct ChangeNotifier {
    table: RwLock<HandlerTable>,
    change_sender: broadcast::Sender<ConfigChange>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    /// Creates an empty notifier.
    pub fn new() -> Self {
        let (change_sender, _) = broadcast::channel(1000);

        Self {
            table: RwLock::new(HandlerTable::default()),
            change_sender,
        }
    }

    fn read_table(&self) -> RwLockReadGuard<'_, HandlerTable> {
        self.table.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, HandlerTable> {
        self.table.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `callback` under `name` for the given keys.
    ///
    /// Re-registering a name replaces its entry and its key memberships.
    pub fn add_handler<K, F>(&self, name: &str, keys: K, context: Value, callback: F)
    where
        K: IntoIterator,
        K::Item: Into<String>,
        F: Fn(&ChangeEvent<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mut table = self.write_table();
        if table.unlink(name).is_some() {
            debug!(handler = name, "Replacing change handler");
        }

        for key in &keys {
            table
                .watched
                .entry(key.clone())
                .or_default()
                .push(name.to_string());
        }

        table.handlers.insert(
            name.to_string(),
            HandlerEntry {
                keys,
                callback: Arc::new(callback),
                context,
            },
        );
    }

    /// Removes a handler and scrubs it from the reverse index.
    ///
    /// Returns whether a handler by that name existed.
    pub fn remove_handler(&self, name: &str) -> bool {
        self.write_table().unlink(name).is_some()
    }

    /// The callback registered under `name`.
    pub fn get_handler(&self, name: &str) -> Option<Handler> {
        self.read_table()
            .handlers
            .get(name)
            .map(|entry| Arc::clone(&entry.callback))
    }

    /// Names of all registered handlers, sorted.
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_table().handlers.keys().cloned().collect();
        names.sort();
        names
    }

    #[cfg(test)]
    fn watchers_of(&self, key: &str) -> Vec<String> {
        self.read_table()
            .watched
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Diffs two cache snapshots and dispatches every changed key.
    ///
    /// Returns the number of handler invocations.
    pub fn notify_batch(
        &self,
        old: &Map<String, Value>,
        new: &Map<String, Value>,
        source: ChangeSource,
    ) -> usize {
        self.dispatch(diff_caches(old, new, source))
    }

    /// Dispatches a change to a single key, as observed by a foreground write.
    ///
    /// Returns the number of handler invocations.
    pub fn notify_single(
        &self,
        key: &str,
        old_value: Option<&Value>,
        new_value: Option<&Value>,
        source: ChangeSource,
    ) -> usize {
        let change = ConfigChange::new(
            key.to_string(),
            old_value.cloned(),
            new_value.cloned(),
            source,
        );

        self.dispatch(vec![change])
    }

    /// Broadcasts each change and runs the handlers watching its key.
    ///
    /// Handlers only see keys present on both sides of the change; additions
    /// and removals reach stream subscribers alone. Handlers run without any
    /// lock held, so they may read the store or register handlers themselves.
    pub fn dispatch(&self, changes: Vec<ConfigChange>) -> usize {
        let mut invoked = 0;

        for change in changes {
            if change.old_value.is_none() || change.new_value.is_none() {
                let _ = self.change_sender.send(change);
                continue;
            }

            let targets: Vec<(String, Handler, Value)> = {
                let table = self.read_table();
                table
                    .watched
                    .get(&change.key)
                    .into_iter()
                    .flatten()
                    .filter_map(|name| {
                        table.handlers.get(name).map(|entry| {
                            (name.clone(), Arc::clone(&entry.callback), entry.context.clone())
                        })
                    })
                    .collect()
            };

            for (name, callback, context) in &targets {
                let event = ChangeEvent {
                    handler: name,
                    key: &change.key,
                    old_value: change.old_value.as_ref(),
                    new_value: change.new_value.as_ref(),
                    context,
                    source: &change.source,
                };

                run_handler(callback, &event);
                invoked += 1;
            }

            let _ = self.change_sender.send(change);
        }

        invoked
    }

    /// Creates a stream that yields changes whose key matches `pattern`.
    ///
    /// # Arguments
    /// * `pattern` - A dot-separated key pattern (supports "*" wildcards)
    pub fn subscribe(&self, pattern: &str) -> impl Stream<Item = ConfigChange> + use<> {
        let pattern = pattern.to_string();
        let receiver = self.change_sender.subscribe();

        futures::stream::unfold(receiver, move |mut receiver| {
            let pattern = pattern.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(change) => {
                            if path_matches(&change.key, &pattern) {
                                return Some((change, receiver));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Change subscriber lagged behind");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        })
    }
}

fn run_handler(callback: &Handler, event: &ChangeEvent<'_>) {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
        Ok(Ok(())) => {}
        Ok(Err(HandlerError::Failed(reason))) => {
            warn!(handler = event.handler, key = event.key, %reason, "Change handler failed");
        }
        Ok(Err(HandlerError::Exit(code))) => {
            error!(handler = event.handler, key = event.key, code, "Change handler requested exit");
            std::process::exit(code);
        }
        Err(_) => {
            warn!(handler = event.handler, key = event.key, "Change handler panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use futures::StreamExt;
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn batch_fires_only_for_changed_watched_keys() {
        let notifier = ChangeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        notifier.add_handler("watch", ["a", "b"], Value::Null, move |event| {
            sink.lock().unwrap().push((
                event.key.to_string(),
                event.old_value.cloned(),
                event.new_value.cloned(),
            ));
            Ok(())
        });

        let old = object(json!({"a": 1, "b": 2, "c": 3}));
        let new = object(json!({"a": 1, "b": 5, "c": 4}));

        assert_eq!(notifier.notify_batch(&old, &new, ChangeSource::Reload), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("b".to_string(), Some(json!(2)), Some(json!(5)))]
        );
    }

    #[tokio::test]
    async fn presence_changes_skip_handlers_but_reach_streams() {
        let notifier = ChangeNotifier::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        notifier.add_handler("watch", ["a", "b"], Value::Null, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let changes = notifier.subscribe("*");
        tokio::pin!(changes);

        let old = object(json!({"a": 1}));
        let new = object(json!({"b": 2}));

        assert_eq!(notifier.notify_batch(&old, &new, ChangeSource::Reload), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let first = changes.next().await.unwrap();
        let second = changes.next().await.unwrap();
        assert_eq!((first.key.as_str(), first.new_value), ("a", None));
        assert_eq!((second.key.as_str(), second.old_value), ("b", None));
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_stop_others() {
        let notifier = ChangeNotifier::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        notifier.add_handler("fails", ["k"], Value::Null, |_| {
            Err(HandlerError::Failed("boom".to_string()))
        });
        notifier.add_handler("panics", ["k"], Value::Null, |_| -> HandlerResult {
            panic!("handler bug")
        });
        notifier.add_handler("works", ["k"], Value::Null, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let invoked =
            notifier.notify_single("k", Some(&json!(1)), Some(&json!(2)), ChangeSource::Write);

        assert_eq!(invoked, 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn context_is_passed_through() {
        let notifier = ChangeNotifier::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        notifier.add_handler("ctx", ["k"], json!({"tag": "db"}), move |event| {
            *sink.lock().unwrap() = Some(event.context.clone());
            Ok(())
        });

        notifier.notify_single("k", Some(&json!(0)), Some(&json!(1)), ChangeSource::Write);
        assert_eq!(*seen.lock().unwrap(), Some(json!({"tag": "db"})));
    }

    #[test]
    fn re_registering_replaces_key_memberships() {
        let notifier = ChangeNotifier::new();

        notifier.add_handler("h", ["a", "b"], Value::Null, |_| Ok(()));
        notifier.add_handler("h", ["c"], Value::Null, |_| Ok(()));

        assert!(notifier.watchers_of("a").is_empty());
        assert!(notifier.watchers_of("b").is_empty());
        assert_eq!(notifier.watchers_of("c"), vec!["h".to_string()]);
        assert_eq!(notifier.handler_names(), vec!["h".to_string()]);
    }

    #[test]
    fn remove_handler_scrubs_reverse_index() {
        let notifier = ChangeNotifier::new();

        notifier.add_handler("one", ["a"], Value::Null, |_| Ok(()));
        notifier.add_handler("two", ["a"], Value::Null, |_| Ok(()));

        assert!(notifier.remove_handler("one"));
        assert!(!notifier.remove_handler("one"));
        assert_eq!(notifier.watchers_of("a"), vec!["two".to_string()]);
        assert!(notifier.get_handler("one").is_none());
        assert!(notifier.get_handler("two").is_some());
    }

    #[test]
    fn handlers_may_reenter_the_notifier() {
        let notifier = Arc::new(ChangeNotifier::new());
        let inner = Arc::clone(&notifier);

        notifier.add_handler("reentrant", ["k"], Value::Null, move |_| {
            inner.add_handler("late", ["other"], Value::Null, |_| Ok(()));
            Ok(())
        });

        notifier.notify_single("k", Some(&json!(false)), Some(&json!(true)), ChangeSource::Write);
        assert_eq!(notifier.watchers_of("other"), vec!["late".to_string()]);
    }
}
