//! Association end multiplicities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bounds on how many instances may sit at one end of an association.
///
/// An `upper` of `0` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Multiplicity {
    pub lower: u32,
    pub upper: u32,
}

impl Multiplicity {
    /// `*` / `0..many`.
    pub const ANY: Self = Self { lower: 0, upper: 0 };
    /// `1`.
    pub const ONE: Self = Self { lower: 1, upper: 1 };

    #[must_use]
    pub const fn new(lower: u32, upper: u32) -> Self {
        Self { lower, upper }
    }

    /// True when at least one partner is required.
    #[must_use]
    pub const fn is_mandatory(self) -> bool {
        self.lower >= 1
    }

    #[must_use]
    pub const fn is_unbounded(self) -> bool {
        self.upper == 0
    }

    /// True when at most one partner may exist.
    #[must_use]
    pub const fn is_single(self) -> bool {
        self.upper == 1
    }

    /// Returns true if `count` lies inside the bounds.
    #[must_use]
    pub const fn admits(self, count: usize) -> bool {
        let count = count as u64;
        count >= self.lower as u64 && (self.is_unbounded() || count <= self.upper as u64)
    }
}

impl Default for Multiplicity {
    fn default() -> Self {
        Self::ANY
    }
}

fn parse_bound(text: &str, source: &str) -> Result<Option<u32>, ConfigError> {
    match text.trim() {
        "*" | "many" | "n" => Ok(None),
        other => other
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidMultiplicity {
                value: source.to_string(),
                reason: format!("'{other}' is not a bound"),
            }),
    }
}

impl FromStr for Multiplicity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidMultiplicity {
                value: s.to_string(),
                reason: "empty multiplicity".to_string(),
            });
        }

        let (lower, upper) = match trimmed.split_once("..") {
            Some((lo, hi)) => (
                parse_bound(lo, s)?.ok_or_else(|| ConfigError::InvalidMultiplicity {
                    value: s.to_string(),
                    reason: "lower bound must be a number".to_string(),
                })?,
                parse_bound(hi, s)?.unwrap_or(0),
            ),
            None => match parse_bound(trimmed, s)? {
                Some(n) => (n, n),
                None => (0, 0),
            },
        };

        if upper != 0 && upper < lower {
            return Err(ConfigError::InvalidMultiplicity {
                value: s.to_string(),
                reason: format!("upper bound {upper} is below lower bound {lower}"),
            });
        }
        Ok(Self { lower, upper })
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.lower, self.upper) {
            (0, 0) => write!(f, "*"),
            (lo, 0) => write!(f, "{lo}..*"),
            (lo, hi) if lo == hi => write!(f, "{lo}"),
            (lo, hi) => write!(f, "{lo}..{hi}"),
        }
    }
}
