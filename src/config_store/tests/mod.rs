//! Unit tests for config_store module
//! No filesystem, timing, or external dependencies.

#![allow(clippy::panic, clippy::unwrap_used)]


use std::{io, path::PathBuf};

use serde_json::{Map, Value, json};

use crate::config_store::{
    ChangeSource, ConfigError, ConfigStatus, GetOptions, StoreOptions, ValueKind, WriteOutcome,
    diff::diff_caches,
    file_ops::{PRIVATE_KEY, VERSION, VERSION_KEY, WELCOME_KEY, bootstrap_document},
    path_ops::path_matches,
};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

#[test]
fn status_codes_follow_declaration_order() {
    assert_eq!(ConfigStatus::Correct.code(), 0);
    assert_eq!(ConfigStatus::DecodeError.code(), 1);
    assert_eq!(ConfigStatus::FileNotFound.code(), 2);
    assert_eq!(ConfigStatus::PermissionError.code(), 3);
    assert_eq!(ConfigStatus::OsError.code(), 4);
    assert_eq!(ConfigStatus::UnknownError.code(), 5);
    assert_eq!(ConfigStatus::FileNotFound.to_string(), "file not found (2)");
}

#[test]
fn io_errors_are_classified_by_kind() {
    let path = PathBuf::from("/tmp/missing.json");

    let missing = ConfigError::from_io(&path, io::Error::from(io::ErrorKind::NotFound));
    assert!(matches!(missing, ConfigError::NotFound { .. }));
    assert_eq!(missing.status(), ConfigStatus::FileNotFound);

    let denied = ConfigError::from_io(&path, io::Error::from(io::ErrorKind::PermissionDenied));
    assert_eq!(denied.status(), ConfigStatus::PermissionError);

    let other = ConfigError::from_io(&path, io::Error::other("disk on fire"));
    assert!(matches!(other, ConfigError::Io { .. }));
    assert_eq!(other.status(), ConfigStatus::OsError);
}

#[test]
fn decode_errors_map_to_decode_status() {
    let source = serde_json::from_str::<Value>("{not json").unwrap_err();
    let error = ConfigError::Decode {
        path: PathBuf::from("a.json"),
        source,
    };
    assert_eq!(error.status(), ConfigStatus::DecodeError);

    let error = ConfigError::NotAnObject {
        path: PathBuf::from("a.json"),
    };
    assert_eq!(error.status(), ConfigStatus::DecodeError);

    let error = ConfigError::Unknown {
        details: "?".to_string(),
    };
    assert_eq!(error.status(), ConfigStatus::UnknownError);
}

#[test]
fn diff_reports_value_and_presence_changes() {
    let old = object(json!({"same": 1, "changed": "a", "gone": true}));
    let new = object(json!({"same": 1, "changed": "b", "added": [1, 2]}));

    let changes = diff_caches(&old, &new, ChangeSource::Reload);
    let keys: Vec<&str> = changes.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, vec!["added", "changed", "gone"]);

    let added = &changes[0];
    assert_eq!(added.old_value, None);
    assert_eq!(added.new_value, Some(json!([1, 2])));

    let gone = &changes[2];
    assert_eq!(gone.old_value, Some(json!(true)));
    assert_eq!(gone.new_value, None);
    assert!(changes.iter().all(|c| c.source == ChangeSource::Reload));
}

#[test]
fn diff_of_identical_caches_is_empty() {
    let cache = object(json!({"a": {"nested": [1, 2, 3]}, "b": null}));
    assert!(diff_caches(&cache, &cache.clone(), ChangeSource::Reload).is_empty());
}

#[test]
fn path_patterns() {
    assert!(path_matches("db.port", "db.port"));
    assert!(path_matches("db.port", "db.*"));
    assert!(path_matches("db.pool.size", "db.*"));
    assert!(path_matches("anything", "*"));
    assert!(path_matches("db.port", "*.port"));
    assert!(!path_matches("db", "db.*"));
    assert!(!path_matches("cache.port", "db.*"));
    assert!(!path_matches("db.port.extra", "db.port"));
}

#[test]
fn matching_kinds_pass_through_unchanged() {
    assert_eq!(ValueKind::Int.resolve(json!(3), false), Some(json!(3)));
    assert_eq!(ValueKind::Str.resolve(json!("x"), false), Some(json!("x")));
    assert_eq!(ValueKind::Any.resolve(json!({"a": 1}), false), Some(json!({"a": 1})));
    assert_eq!(ValueKind::Int.resolve(json!("3"), false), None);
}

#[test]
fn scalar_conversions() {
    assert_eq!(ValueKind::Int.resolve(json!("42"), true), Some(json!(42)));
    assert_eq!(ValueKind::Int.resolve(json!(" 7 "), true), Some(json!(7)));
    assert_eq!(ValueKind::Int.resolve(json!(2.9), true), Some(json!(2)));
    assert_eq!(ValueKind::Int.resolve(json!(true), true), Some(json!(1)));
    assert_eq!(ValueKind::Int.resolve(json!("seven"), true), None);

    assert_eq!(ValueKind::Float.resolve(json!(3), true), Some(json!(3.0)));
    assert_eq!(ValueKind::Float.resolve(json!("1.5"), true), Some(json!(1.5)));

    assert_eq!(ValueKind::Str.resolve(json!(12), true), Some(json!("12")));
    assert_eq!(ValueKind::Str.resolve(json!([1, 2]), true), Some(json!("[1,2]")));

    assert_eq!(ValueKind::Bool.resolve(json!(0), true), Some(json!(false)));
    assert_eq!(ValueKind::Bool.resolve(json!("no"), true), Some(json!(true)));
    assert_eq!(ValueKind::Bool.resolve(json!([]), true), Some(json!(false)));
}

#[test]
fn sequence_conversions() {
    assert_eq!(
        ValueKind::List.resolve(json!("abc"), true),
        Some(json!(["a", "b", "c"]))
    );
    assert_eq!(
        ValueKind::Tuple.resolve(json!({"x": 1, "y": 2}), true),
        Some(json!(["x", "y"]))
    );
    assert_eq!(
        ValueKind::Set.resolve(json!("aab"), true),
        Some(json!(["a", "b"]))
    );
    assert_eq!(ValueKind::List.resolve(json!(5), true), None);
}

#[test]
fn dict_conversion_enumerates_elements() {
    assert_eq!(
        ValueKind::Dict.resolve(json!(["a", "b"]), true),
        Some(json!({"0": "a", "1": "b"}))
    );
    assert_eq!(ValueKind::Dict.resolve(json!(1), true), None);
}

#[test]
fn kind_names_parse_with_aliases() {
    assert_eq!("int".parse::<ValueKind>().unwrap(), ValueKind::Int);
    assert_eq!("String".parse::<ValueKind>().unwrap(), ValueKind::Str);
    assert_eq!("object".parse::<ValueKind>().unwrap(), ValueKind::Dict);
    assert!(matches!(
        "matrix".parse::<ValueKind>(),
        Err(ConfigError::InvalidArgument { .. })
    ));
    assert_eq!(ValueKind::Tuple.to_string(), "tuple");
}

#[test]
fn bootstrap_document_is_public() {
    let document = bootstrap_document();

    assert_eq!(document.get(PRIVATE_KEY), Some(&Value::Bool(false)));
    assert_eq!(document.get(VERSION_KEY), Some(&Value::from(VERSION)));
    assert!(document.contains_key(WELCOME_KEY));
}

#[test]
fn store_options_resolve_paths() {
    let options = StoreOptions::new("app", "/etc/app").filename("settings.json");
    assert_eq!(
        options.resolve_path().unwrap(),
        PathBuf::from("/etc/app/settings.json")
    );

    let options = StoreOptions::new("app", "/etc/app.json");
    assert_eq!(options.resolve_path().unwrap(), PathBuf::from("/etc/app.json"));
    assert_eq!(options.reload_interval, 1.0);
}

#[test]
fn store_options_reject_bad_arguments() {
    let cases = [
        StoreOptions::new("", "/etc/app.json"),
        StoreOptions::new("app", ""),
        StoreOptions::new("app", "/etc").filename("nested/app.json"),
        StoreOptions::new("app", "/etc/app.json").reload_interval(f64::NAN),
        StoreOptions::new("app", "/etc/app.json").reload_interval(f64::INFINITY),
    ];

    for options in cases {
        assert!(
            matches!(options.resolve_path(), Err(ConfigError::InvalidArgument { .. })),
            "accepted {options:?}"
        );
    }
}

#[test]
fn store_options_deserialize_with_defaults() {
    let options: StoreOptions =
        serde_json::from_value(json!({"name": "svc", "path": "/srv/svc.json"})).unwrap();

    assert_eq!(options, StoreOptions::new("svc", "/srv/svc.json"));
}

#[test]
fn get_options_defaults() {
    let options = GetOptions::new();

    assert_eq!(options.kind, ValueKind::Any);
    assert_eq!(options.default, Value::Null);
    assert!(options.save_unknown);
    assert!(!options.allow_command);
    assert!(!options.auto_convert);
}

#[test]
fn write_outcome_tri_state() {
    assert_eq!(WriteOutcome::Applied.as_option(), Some(true));
    assert_eq!(WriteOutcome::Failed.as_option(), Some(false));
    assert_eq!(WriteOutcome::Missing.as_option(), Some(false));
    assert_eq!(WriteOutcome::Denied.as_option(), None);
    assert!(WriteOutcome::Applied.is_applied());
    assert!(!WriteOutcome::Denied.is_applied());
}
