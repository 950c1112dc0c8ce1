use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

/// How artifacts are fingerprinted to detect change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMode {
    /// blake3 digest of the file contents.
    Hash,
    /// File modification time, compared with an epsilon.
    Mtime,
}

impl Default for FingerprintMode {
    fn default() -> Self {
        FingerprintMode::Hash
    }
}

impl FromStr for FingerprintMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(FingerprintMode::Hash),
            "mtime" => Ok(FingerprintMode::Mtime),
            other => Err(format!(
                "invalid fingerprint mode: {other} (expected \"hash\" or \"mtime\")"
            )),
        }
    }
}

/// What a `plan` / `run` / `touch` invocation is asked to bring up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every terminal task together with its ancestors (`full`).
    All,
    /// A single named task and its ancestors.
    Task(TaskName),
}

impl Target {
    /// Keyword accepted for [`Target::All`].
    pub const ALL_KEYWORD: &'static str = "full";

    /// Build a target from user input.
    ///
    /// `None`, `"full"` and `"all"` select every task; anything else is a
    /// task name. The registry decides later whether a task literally named
    /// `full` shadows the keyword.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => Target::All,
            Some(Self::ALL_KEYWORD) => Target::All,
            Some(name) => Target::Task(name.to_string()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => f.write_str(Self::ALL_KEYWORD),
            Target::Task(name) => f.write_str(name),
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let split_at = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;
    let (num_part, unit) = s.split_at(split_at);

    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;

    let secs_per_unit = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        other => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                other
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}

/// Normalise an artifact identifier so that `./out/a.txt` and `out/a.txt`
/// name the same artifact.
pub fn normalize_artifact(raw: &str) -> String {
    let mut s = raw.trim();
    while let Some(rest) = s.strip_prefix("./") {
        s = rest;
    }
    s.trim_end_matches('/').to_string()
}
