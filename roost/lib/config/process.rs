//! Per-server process lifecycle rules.

use std::{fmt, str::FromStr};

use getset::Getters;
use regex::bytes::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use typed_builder::TypedBuilder;

use crate::RoostError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Prefix marking a matcher pattern as a regular expression rather than a
/// plain substring.
pub const REGEX_MATCHER_PREFIX: &str = "regex:";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Lifecycle rules for a managed process: how to tell from console output
/// that it finished starting, and how it is told to stop.
///
/// These rules come from an external configuration store and may be replaced
/// at runtime; the supervisor reads them fresh for every check.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ProcessConfiguration {
    /// The rules used to detect a completed startup.
    #[serde(default)]
    #[builder(default)]
    pub(super) startup: StartupDetection,

    /// The directive used to stop the process.
    #[serde(default)]
    #[builder(default)]
    pub(super) stop: StopConfiguration,
}

/// Console-based startup detection rules.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct StartupDetection {
    /// Ordered matchers tested against console lines while the process is
    /// starting; the first match marks the process as running.
    #[serde(default)]
    #[builder(default)]
    pub(super) done: Vec<OutputLineMatcher>,

    /// Whether matching runs against a working copy with ANSI escape
    /// sequences stripped.
    #[serde(default)]
    #[builder(default)]
    pub(super) strip_ansi: bool,
}

/// A single console line matcher.
///
/// A plain pattern matches as a substring anywhere in the line; a pattern
/// prefixed with `regex:` compiles the remainder as a regular expression.
/// Either way matching runs over raw bytes, so console lines do not need to
/// be valid UTF-8.
#[derive(Debug, Clone)]
pub struct OutputLineMatcher {
    /// The pattern as originally configured.
    raw: String,

    /// The compiled form used for matching.
    regex: Regex,
}

/// The directive used to stop a managed process.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct StopConfiguration {
    /// How the stop directive is delivered.
    #[serde(rename = "type", default)]
    #[builder(default)]
    pub(super) method: StopMethod,

    /// The command or signal value, for methods that need one.
    #[serde(default)]
    #[builder(default)]
    pub(super) value: String,
}

/// How a stop directive is delivered to the process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopMethod {
    /// Write a command to the process's standard input.
    #[serde(rename = "command")]
    Command,

    /// Send a POSIX signal to the process.
    #[serde(rename = "signal")]
    Signal,

    /// Use the runtime's native stop mechanism.
    #[default]
    #[serde(rename = "stop")]
    Native,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OutputLineMatcher {
    /// Tests a console line against the matcher.
    pub fn matches(&self, line: &[u8]) -> bool {
        self.regex.is_match(line)
    }

    /// The pattern as originally configured.
    pub fn pattern(&self) -> &str {
        &self.raw
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for OutputLineMatcher {
    type Err = RoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let regex = match s.strip_prefix(REGEX_MATCHER_PREFIX) {
            // A bare "regex:" prefix is treated as a substring pattern.
            Some(pattern) if !pattern.is_empty() => Regex::new(pattern)
                .map_err(|err| RoostError::InvalidOutputMatcher(s.to_string(), err))?,
            _ => Regex::new(&regex::escape(s))
                .map_err(|err| RoostError::InvalidOutputMatcher(s.to_string(), err))?,
        };

        Ok(Self {
            raw: s.to_string(),
            regex,
        })
    }
}

impl PartialEq for OutputLineMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Display for OutputLineMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Serialize for OutputLineMatcher {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for OutputLineMatcher {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
