use std::{collections::BTreeSet, time::Instant};

use serde_json::{Map, Value};

use super::{ChangeSource, ConfigChange};

/// Compares two cache snapshots key by key.
///
/// A key counts as changed when its value differs or when it is present on
/// only one side. Nested objects are compared as whole values; the cache is
/// keyed on top-level names only.
///
/// # Arguments
/// * `old` - The previous cache contents
/// * `new` - The cache contents that replace them
/// * `source` - What triggered the comparison
pub fn diff_caches(
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    source: ChangeSource,
) -> Vec<ConfigChange> {
    let timestamp = Instant::now();

    let mut all_keys = BTreeSet::new();
    all_keys.extend(old.keys());
    all_keys.extend(new.keys());

    all_keys
        .into_iter()
        .filter_map(|key| {
            let (old_value, new_value) = (old.get(key), new.get(key));
            if old_value == new_value {
                return None;
            }

            Some(ConfigChange {
                key: key.clone(),
                old_value: old_value.cloned(),
                new_value: new_value.cloned(),
                source: source.clone(),
                timestamp,
            })
        })
        .collect()
}
