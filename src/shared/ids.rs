use getrandom::getrandom;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RUN_SUFFIX_WIDTH: usize = 6;
const RUN_SUFFIX_SPACE: u64 = 36 * 36 * 36 * 36 * 36 * 36;

pub fn validate_identifier_value(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Ok(());
    }
    Err(format!(
        "{kind} must use only ASCII letters, digits, '-' or '_'"
    ))
}

/// Identifier of a single run. Doubles as the run's directory name, so only
/// path-safe characters are accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn parse(raw: &str) -> Result<Self, String> {
        validate_identifier_value("run id", raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::borrow::Borrow<str> for RunId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<Path> for RunId {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl TryFrom<String> for RunId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(|err| D::Error::custom(format!("invalid run id `{raw}`: {err}")))
    }
}

/// Allocates a run id of the form `run-<base36 unix millis>-<6 base36 chars>`.
///
/// Uniqueness is probabilistic and never checked against storage: two ids
/// minted in the same millisecond collide with probability 1 / 36^6.
pub fn allocate_run_id() -> Result<RunId, String> {
    allocate_run_id_at(now_millis())
}

pub fn allocate_run_id_at(now_millis: u64) -> Result<RunId, String> {
    let mut bytes = [0_u8; 8];
    getrandom(&mut bytes).map_err(|err| format!("failed to generate run id randomness: {err}"))?;
    let sample = u64::from_le_bytes(bytes) % RUN_SUFFIX_SPACE;
    Ok(RunId(format!(
        "run-{}-{}",
        base36_encode_u64(now_millis),
        base36_encode_fixed(sample, RUN_SUFFIX_WIDTH)
    )))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    chars.iter().rev().collect()
}

fn base36_encode_fixed(mut value: u64, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}
