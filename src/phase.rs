//! Phase identifiers and the dependency token grammar.
//!
//! A phase id is an ordered (major, optional minor) pair. Decimal phases like
//! "06.2" are inserted between integer phases, so ids must never be compared
//! as floats or raw strings ("06.10" sorts after "06.9").

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

static PHASE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)phase\s+(\d+(?:\.\d+)?)").unwrap());
static NO_DEPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)nothing|none|n/a|first phase").unwrap());

/// A two-part ordered phase identifier.
///
/// Derived `Ord` compares major, then minor, with `None < Some(_)` — exactly
/// the required order (phase 7 < 7.1 < 7.2 < 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseId {
    major: u32,
    minor: Option<u32>,
}

impl PhaseId {
    pub fn new(major: u32) -> Self {
        Self { major, minor: None }
    }

    pub fn with_minor(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor: Some(minor),
        }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> Option<u32> {
        self.minor
    }

    /// Zero-padded directory form: "07", "06.2".
    ///
    /// Used for worktree keys (`p07`), branch names (`phase-07`), and phase
    /// directory prefixes.
    pub fn normalized(&self) -> String {
        match self.minor {
            Some(minor) => format!("{:02}.{}", self.major, minor),
            None => format!("{:02}", self.major),
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "{}.{}", self.major, minor),
            None => write!(f, "{}", self.major),
        }
    }
}

impl FromStr for PhaseId {
    type Err = String;

    /// Accepts "7", "07", "6.2", or a longer token starting with a phase
    /// number (e.g. "07-auth-layer").
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let digits_end = s.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(s.len());
        let head = &s[..digits_end];
        if head.is_empty() {
            return Err(format!("invalid phase id: {:?}", s));
        }
        let mut parts = head.splitn(2, '.');
        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| format!("invalid phase id: {:?}", s))?;
        let minor = match parts.next() {
            Some(m) if !m.is_empty() => {
                Some(m.parse::<u32>().map_err(|_| format!("invalid phase id: {:?}", s))?)
            }
            Some(_) => return Err(format!("invalid phase id: {:?}", s)),
            None => None,
        };
        Ok(PhaseId { major, minor })
    }
}

impl Serialize for PhaseId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PhaseId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PhaseIdVisitor;

        impl Visitor<'_> for PhaseIdVisitor {
            type Value = PhaseId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a phase id string like \"7\" or \"6.2\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<PhaseId, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(PhaseIdVisitor)
    }
}

/// Parse a free-form "Depends on" declaration into referenced phase ids.
///
/// Tokens matching `Phase <id>` (case-insensitive) are extracted; strings
/// matching nothing/none/n/a/first phase (any case) yield an empty list.
pub fn parse_depends_on(raw: Option<&str>) -> Vec<PhaseId> {
    let raw = match raw {
        Some(r) => r,
        None => return Vec::new(),
    };
    if NO_DEPS.is_match(raw) {
        return Vec::new();
    }
    PHASE_TOKEN
        .captures_iter(raw)
        .filter_map(|cap| cap[1].parse().ok())
        .collect()
}
