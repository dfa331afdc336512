//! Unit tests for CLI module
//!
//! Tests argument parsing, formatting, and one-shot command execution.

#![allow(clippy::panic, clippy::unwrap_used)]

use clap::Parser;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::cli::{
    Cli, CliError, CliService, Commands,
    formatting::{format_value, parse_value},
};
use crate::config_store::ValueKind;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("moca-config").chain(args.iter().copied())).unwrap()
}

#[test]
fn parse_value_prefers_json() {
    assert_eq!(parse_value("42"), json!(42));
    assert_eq!(parse_value("true"), json!(true));
    assert_eq!(parse_value("[1, 2]"), json!([1, 2]));
    assert_eq!(parse_value("\"42\""), json!("42"));
    assert_eq!(parse_value("hello world"), json!("hello world"));
}

#[test]
fn format_value_scalars() {
    assert_eq!(format_value(&json!("hello")), "\"hello\"");
    assert_eq!(format_value(&json!(-3)), "-3");
    assert_eq!(format_value(&json!(2.5)), "2.5");
    assert_eq!(format_value(&Value::Null), "null");
}

#[test]
fn format_value_containers_are_pretty() {
    assert_eq!(format_value(&json!({"a": 1})), "{\n  \"a\": 1\n}");
    assert_eq!(format_value(&json!([])), "[]");
}

#[test]
fn parses_get_with_kind_and_flags() {
    let cli = parse(&["get", "port", "--kind", "int", "--convert", "-d", "8080"]);

    let Commands::Get {
        key,
        kind,
        default,
        convert,
        command,
        no_save,
    } = cli.command
    else {
        panic!("expected get, got {:?}", cli.command);
    };

    assert_eq!(key, "port");
    assert_eq!(kind, ValueKind::Int);
    assert_eq!(default.as_deref(), Some("8080"));
    assert!(convert);
    assert!(!command);
    assert!(!no_save);
}

#[test]
fn rejects_unknown_kind() {
    let result = Cli::try_parse_from(["moca-config", "get", "port", "--kind", "matrix"]);
    assert!(result.is_err());
}

#[test]
fn global_flags_apply_after_subcommand() {
    let cli = parse(&["keys", "--file", "/tmp/x.json", "--interval", "-1", "-vv"]);

    assert_eq!(cli.file.to_str(), Some("/tmp/x.json"));
    assert_eq!(cli.interval, -1.0);
    assert_eq!(cli.log_level(), "debug");
}

#[test]
fn set_then_get_through_the_service() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("cli.json");
    let file = file.to_str().unwrap();

    let set = parse(&["set", "retries", "3", "--file", file, "--interval", "-1"]);
    let service = CliService::new(&set);
    assert_eq!(service.execute(&set.command).unwrap(), "ok");

    let get = parse(&["get", "retries", "--kind", "int"]);
    assert_eq!(service.execute(&get.command).unwrap(), "3");

    service.shutdown();
}

#[test]
fn removing_a_missing_key_is_not_found() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("cli.json");

    let cli = parse(&["remove", "ghost", "--file", file.to_str().unwrap(), "--interval", "-1"]);
    let service = CliService::new(&cli);

    assert!(matches!(
        service.execute(&cli.command),
        Err(CliError::NotFound(key)) if key == "ghost"
    ));

    service.shutdown();
}

#[test]
fn expand_needs_no_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("never.json");

    let cli = parse(&[
        "expand",
        "[el]#moca_random_integers<6>#",
        "--file",
        file.to_str().unwrap(),
    ]);
    let service = CliService::new(&cli);
    let output = service.execute(&cli.command).unwrap();

    assert_eq!(output.len(), 8);
    assert!(!file.exists());

    let cli = parse(&["expand", "plain"]);
    assert!(matches!(
        service.execute(&cli.command),
        Err(CliError::InvalidArguments(_))
    ));
}
