//! Plugin version ordering
//!
//! Versions are compared numerically per dot-separated component, so
//! `1.22` orders above `1.8`. Parsing is lenient and never fails:
//!
//! - a leading `v`/`V` directly followed by a digit is ignored
//! - each component is a numeric prefix plus an optional textual suffix
//!   (`3-SNAPSHOT` is `3` with suffix `-SNAPSHOT`, `beta` is `0` with suffix `beta`)
//! - numbers compare first; then a component without suffix ranks above one
//!   with a suffix (`1.0` > `1.0-rc1`), and two suffixes compare lexicographically
//! - missing trailing components count as `0`, so `1.2 == 1.2.0`
//! - numeric prefixes too large for `u64` saturate at `u64::MAX`

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// One dot-separated component of a [`PluginVersion`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VersionComponent {
    pub number: u64,
    pub suffix: String,
}

impl VersionComponent {
    fn parse(part: &str) -> Self {
        let digits_end = part
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(part.len());
        let (digits, suffix) = part.split_at(digits_end);
        let number = if digits.is_empty() {
            0
        } else {
            digits.parse::<u64>().unwrap_or(u64::MAX)
        };

        Self {
            number,
            suffix: suffix.to_string(),
        }
    }
}

impl Ord for VersionComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number.cmp(&other.number).then_with(|| {
            match (self.suffix.is_empty(), other.suffix.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.suffix.cmp(&other.suffix),
            }
        })
    }
}

impl PartialOrd for VersionComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A version string attached to a plugin artifact
///
/// Equality follows the ordering: `1.2` and `1.2.0` are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PluginVersion {
    raw: String,
    components: Vec<VersionComponent>,
}

impl PluginVersion {
    /// Parse a version string
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let body = match trimmed.strip_prefix(|c: char| c == 'v' || c == 'V') {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
            _ => trimmed,
        };

        let components = if body.is_empty() {
            Vec::new()
        } else {
            body.split('.').map(VersionComponent::parse).collect()
        };

        Self {
            raw: raw.to_string(),
            components,
        }
    }

    /// The string this version was parsed from
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn components(&self) -> &[VersionComponent] {
        &self.components
    }
}

impl Ord for PluginVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let zero = VersionComponent::default();
        let len = self.components.len().max(other.components.len());
        (0..len)
            .map(|i| {
                let a = self.components.get(i).unwrap_or(&zero);
                let b = other.components.get(i).unwrap_or(&zero);
                a.cmp(b)
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for PluginVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PluginVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PluginVersion {}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PluginVersion {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for PluginVersion {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for PluginVersion {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<PluginVersion> for String {
    fn from(version: PluginVersion) -> Self {
        version.raw
    }
}
