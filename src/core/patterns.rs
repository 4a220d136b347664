//! Marker and naming definitions for the log analyzer
//!
//! This module contains the literal line markers emitted by the generator jobs,
//! the regex patterns used to pull numbers out of marker lines, and the naming
//! layout that ties a prepID to its stdout/stderr log files.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

lazy_static! {
    /// Plain decimal token, e.g. `12.5` or `250`
    static ref DECIMAL_TOKEN: Regex = Regex::new(r"\d+(?:\.\d+)?").unwrap();

    /// Decimal token with an optional signed exponent, e.g. `1.23e-05`
    static ref EXPONENTIAL_TOKEN: Regex = Regex::new(r"\d+(?:\.\d+)?(?:[eE][+-]?\d+)?").unwrap();
}

/// Which of the two job logs a marker lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "Stdout"),
            Stream::Stderr => write!(f, "Stderr"),
        }
    }
}

/// A fixed line prefix identifying a metric in an unstructured job log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    CrossSection,
    FilterEfficiency,
    MatchEfficiency,
    TimePerEvent,
    SizePerEvent,
}

/// All markers, in report column order
pub const ALL_MARKERS: [Marker; 5] = [
    Marker::CrossSection,
    Marker::FilterEfficiency,
    Marker::MatchEfficiency,
    Marker::TimePerEvent,
    Marker::SizePerEvent,
];

/// Stdout markers. Every line is tested against each of them.
pub const STDOUT_MARKERS: [Marker; 2] = [Marker::SizePerEvent, Marker::TimePerEvent];

/// Stderr markers in priority order. A line is attributed to the first match only.
pub const STDERR_MARKERS: [Marker; 3] = [
    Marker::CrossSection,
    Marker::FilterEfficiency,
    Marker::MatchEfficiency,
];

impl Marker {
    /// The literal a line must start with to carry this metric
    pub fn literal(self) -> &'static str {
        match self {
            Marker::CrossSection => "After filter: final cross section",
            Marker::FilterEfficiency => "Filter efficiency (event-level)",
            Marker::MatchEfficiency => "Matching efficiency",
            Marker::TimePerEvent => "McM time_event",
            Marker::SizePerEvent => "McM Size/event",
        }
    }

    /// Log the marker is searched in
    pub fn stream(self) -> Stream {
        match self {
            Marker::TimePerEvent | Marker::SizePerEvent => Stream::Stdout,
            _ => Stream::Stderr,
        }
    }

    /// Human readable name used in warnings
    pub fn label(self) -> &'static str {
        match self {
            Marker::CrossSection => "Cross section",
            Marker::FilterEfficiency => "Filter efficiency",
            Marker::MatchEfficiency => "Matching efficiency",
            Marker::TimePerEvent => "Time/event",
            Marker::SizePerEvent => "Size/event",
        }
    }

    /// Check whether a log line carries this marker
    pub fn matches(self, line: &str) -> bool {
        line.starts_with(self.literal())
    }

    /// Parse the first number token of a marker line.
    ///
    /// Only the cross section is reported in exponential notation; the other
    /// metrics are plain decimals.
    pub fn parse_value(self, line: &str) -> Option<f64> {
        let token = match self {
            Marker::CrossSection => &*EXPONENTIAL_TOKEN,
            _ => &*DECIMAL_TOKEN,
        };
        token.find(line).and_then(|m| m.as_str().parse().ok())
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// File naming convention of a job's log pair: `<prefix><prepid><suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogLayout {
    pub stdout_prefix: String,
    pub stderr_prefix: String,
    pub suffix: String,
}

impl Default for LogLayout {
    fn default() -> Self {
        Self {
            stdout_prefix: "out_".to_string(),
            stderr_prefix: "err_".to_string(),
            suffix: ".txt".to_string(),
        }
    }
}

impl LogLayout {
    /// Extract the prepID from a stdout file name.
    ///
    /// The prefix is removed from the start and the suffix from the end, once
    /// each. Names that do not follow the convention, or leave an empty
    /// prepID behind, yield `None`.
    pub fn prepid_from_stdout_name<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let prepid = file_name
            .strip_prefix(self.stdout_prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        (!prepid.is_empty()).then_some(prepid)
    }

    /// File name of the log for `prepid` in the given stream
    pub fn file_name(&self, stream: Stream, prepid: &str) -> String {
        let prefix = match stream {
            Stream::Stdout => &self.stdout_prefix,
            Stream::Stderr => &self.stderr_prefix,
        };
        format!("{}{}{}", prefix, prepid, self.suffix)
    }

    /// Full path of the log for `prepid` inside `directory`
    pub fn path_in(&self, directory: &Path, stream: Stream, prepid: &str) -> PathBuf {
        directory.join(self.file_name(stream, prepid))
    }
}
