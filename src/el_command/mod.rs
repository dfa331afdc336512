//! El-commands: reserved sentinel strings that resolve to live values.

use std::sync::LazyLock;

use chrono::Local;
use rand::{Rng, RngCore, distr::Alphanumeric};
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

/// Current local time.
pub const NOW: &str = "[el]#moca_now#";
/// Current local date.
pub const NOW_DATE: &str = "[el]#moca_now_date#";
/// Random alphanumeric string; replace `length` with a number.
pub const RANDOM_STRING: &str = "[el]#moca_random_string<length>#";
/// One random digit.
pub const RANDOM_INTEGER: &str = "[el]#moca_random_integer#";
/// List of random digits; replace `length` with a number.
pub const RANDOM_INTEGER_LIST: &str = "[el]#moca_random_integer_list<length>#";
/// String of random digits; replace `length` with a number.
pub const RANDOM_INTEGERS: &str = "[el]#moca_random_integers<length>#";
/// Time-based UUID, hyphenated.
pub const UUID1: &str = "[el]#moca_uuid1#";
/// Time-based UUID, bare hex.
pub const UUID1_HEX: &str = "[el]#moca_uuid1_hex#";
/// Random UUID, hyphenated.
pub const UUID4: &str = "[el]#moca_uuid4#";
/// Random UUID, bare hex.
pub const UUID4_HEX: &str = "[el]#moca_uuid4_hex#";
/// Id of the current process.
pub const PROCESS_ID: &str = "[el]#moca_process_id#";
/// Name of the current executable.
pub const PROCESS_NAME: &str = "[el]#moca_process_name#";
/// Number of available CPUs.
pub const CPU_COUNT: &str = "[el]#moca_cpu_count#";
/// The whole cache of the store being read.
pub const GET_ALL_CONFIG: &str = "[el]#moca_get_all_config#";

/// Upper bound on generated lengths; larger requests do not match.
pub const MAX_GENERATED_LEN: usize = 1 << 16;

static SIZED_COMMAND: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\[el\]#moca_(random_string|random_integer_list|random_integers)<(.*)>#$").ok()
});

static NODE_ID: LazyLock<[u8; 6]> = LazyLock::new(|| {
    let mut node = [0u8; 6];
    rand::rng().fill_bytes(&mut node);
    node
});

/// A recognised el-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElCommand {
    /// See [`NOW`].
    Now,
    /// See [`NOW_DATE`].
    NowDate,
    /// See [`RANDOM_STRING`].
    RandomString(usize),
    /// See [`RANDOM_INTEGER`].
    RandomInteger,
    /// See [`RANDOM_INTEGER_LIST`].
    RandomIntegerList(usize),
    /// See [`RANDOM_INTEGERS`].
    RandomIntegers(usize),
    /// See [`UUID1`].
    Uuid1,
    /// See [`UUID1_HEX`].
    Uuid1Hex,
    /// See [`UUID4`].
    Uuid4,
    /// See [`UUID4_HEX`].
    Uuid4Hex,
    /// See [`PROCESS_ID`].
    ProcessId,
    /// See [`PROCESS_NAME`].
    ProcessName,
    /// See [`CPU_COUNT`].
    CpuCount,
    /// See [`GET_ALL_CONFIG`]. Only a store can evaluate it.
    GetAllConfig,
}

impl ElCommand {
    /// Classifies `text` against the command vocabulary.
    ///
    /// Sized commands with a length that is not an integer, or that exceeds
    /// [`MAX_GENERATED_LEN`], do not match. Negative lengths produce empty output.
    pub fn parse(text: &str) -> Option<Self> {
        let command = match text {
            NOW => Self::Now,
            NOW_DATE => Self::NowDate,
            RANDOM_INTEGER => Self::RandomInteger,
            UUID1 => Self::Uuid1,
            UUID1_HEX => Self::Uuid1Hex,
            UUID4 => Self::Uuid4,
            UUID4_HEX => Self::Uuid4Hex,
            PROCESS_ID => Self::ProcessId,
            PROCESS_NAME => Self::ProcessName,
            CPU_COUNT => Self::CpuCount,
            GET_ALL_CONFIG => Self::GetAllConfig,
            _ => return Self::parse_sized(text),
        };

        Some(command)
    }

    fn parse_sized(text: &str) -> Option<Self> {
        let captures = SIZED_COMMAND.as_ref()?.captures(text)?;
        let length: i64 = captures.get(2)?.as_str().trim().parse().ok()?;
        let length = usize::try_from(length.max(0)).ok()?;
        if length > MAX_GENERATED_LEN {
            return None;
        }

        match captures.get(1)?.as_str() {
            "random_string" => Some(Self::RandomString(length)),
            "random_integer_list" => Some(Self::RandomIntegerList(length)),
            "random_integers" => Some(Self::RandomIntegers(length)),
            _ => None,
        }
    }

    /// Computes the live value. Returns `None` for [`ElCommand::GetAllConfig`].
    pub fn evaluate(self) -> Option<Value> {
        let value = match self {
            Self::Now => Value::from(Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
            Self::NowDate => Value::from(Local::now().format("%Y-%m-%d").to_string()),
            Self::RandomString(length) => Value::from(random_string(length)),
            Self::RandomInteger => Value::from(rand::rng().random_range(0..10u8)),
            Self::RandomIntegerList(length) => Value::from(random_integer_list(length)),
            Self::RandomIntegers(length) => Value::from(random_integers(length)),
            Self::Uuid1 => Value::from(Uuid::now_v1(&NODE_ID).hyphenated().to_string()),
            Self::Uuid1Hex => Value::from(Uuid::now_v1(&NODE_ID).simple().to_string()),
            Self::Uuid4 => Value::from(Uuid::new_v4().hyphenated().to_string()),
            Self::Uuid4Hex => Value::from(Uuid::new_v4().simple().to_string()),
            Self::ProcessId => Value::from(std::process::id()),
            Self::ProcessName => Value::from(process_name()),
            Self::CpuCount => Value::from(
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
            ),
            Self::GetAllConfig => return None,
        };

        Some(value)
    }
}

/// Expands `text` if it is an el-command a caller can evaluate standalone.
pub fn expand(text: &str) -> Option<Value> {
    ElCommand::parse(text)?.evaluate()
}

/// Random alphanumeric string of `length` characters.
pub fn random_string(length: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// `length` random digits as a string.
pub fn random_integers(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// `length` random digits.
pub fn random_integer_list(length: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..length).map(|_| rng.random_range(0..10u8)).collect()
}

fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn parses_fixed_vocabulary() {
        assert_eq!(ElCommand::parse(NOW), Some(ElCommand::Now));
        assert_eq!(ElCommand::parse(UUID4_HEX), Some(ElCommand::Uuid4Hex));
        assert_eq!(ElCommand::parse(GET_ALL_CONFIG), Some(ElCommand::GetAllConfig));
        assert_eq!(ElCommand::parse("plain value"), None);
    }

    #[test]
    fn parses_sized_commands() {
        assert_eq!(
            ElCommand::parse("[el]#moca_random_string<8>#"),
            Some(ElCommand::RandomString(8))
        );
        assert_eq!(
            ElCommand::parse("[el]#moca_random_integer_list<3>#"),
            Some(ElCommand::RandomIntegerList(3))
        );
        assert_eq!(
            ElCommand::parse("[el]#moca_random_integers<5>#"),
            Some(ElCommand::RandomIntegers(5))
        );
    }

    #[test]
    fn malformed_lengths_do_not_match() {
        assert_eq!(ElCommand::parse("[el]#moca_random_string<eight>#"), None);
        assert_eq!(ElCommand::parse("[el]#moca_random_string<>#"), None);
        assert_eq!(ElCommand::parse("[el]#moca_random_integers<1.5>#"), None);
        assert_eq!(ElCommand::parse("[el]#moca_random_string<99999999>#"), None);
    }

    #[test]
    fn random_string_has_requested_length() {
        let value = expand("[el]#moca_random_string<8>#");
        let Some(Value::String(s)) = value else {
            panic!("expected a string, got {value:?}");
        };

        assert_eq!(s.len(), 8);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn digit_commands_stay_in_range() {
        let Some(Value::Array(digits)) = expand("[el]#moca_random_integer_list<20>#") else {
            panic!("expected a list");
        };
        assert_eq!(digits.len(), 20);
        assert!(digits.iter().all(|d| d.as_u64().is_some_and(|d| d < 10)));

        let Some(Value::String(digits)) = expand("[el]#moca_random_integers<12>#") else {
            panic!("expected a string");
        };
        assert_eq!(digits.len(), 12);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn uuid_commands_have_expected_shapes() {
        let Some(Value::String(hyphenated)) = expand(UUID1) else {
            panic!("expected a string");
        };
        assert_eq!(hyphenated.len(), 36);

        let Some(Value::String(hex)) = expand(UUID4_HEX) else {
            panic!("expected a string");
        };
        assert_eq!(hex.len(), 32);
    }

    #[test]
    fn get_all_config_needs_a_store() {
        assert_eq!(expand(GET_ALL_CONFIG), None);
    }

    #[test]
    fn process_id_matches_current_process() {
        assert_eq!(expand(PROCESS_ID), Some(Value::from(std::process::id())));
    }
}
