//! Per-list revision numbers.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MICROS_PER_SEC: u32 = 1_000_000;

/// A per-list revision number.
///
/// A `Rev` is the shared store's wall clock at commit time: whole seconds
/// plus a microsecond fraction, allocated inside the atomic mutation script
/// so concurrent nodes cannot disagree on ordering. On the wire it travels
/// as a decimal string ("1730484792.123456") because a binary float cannot
/// hold the full microsecond range without loss. Comparison is exact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rev {
    secs: i64,
    micros: u32,
}

/// Error parsing a revision string.
#[derive(Debug, Error)]
#[error("invalid revision {0:?}")]
pub struct RevParseError(pub String);

impl Rev {
    /// The zero revision, ordered before every allocated revision.
    pub const ZERO: Rev = Rev { secs: 0, micros: 0 };

    /// Build a revision from whole seconds and a microsecond fraction.
    /// Microsecond overflow carries into the seconds component.
    pub fn new(secs: i64, micros: u32) -> Self {
        Self {
            secs: secs + i64::from(micros / MICROS_PER_SEC),
            micros: micros % MICROS_PER_SEC,
        }
    }

    /// Whole-second component.
    pub fn secs(&self) -> i64 {
        self.secs
    }

    /// Microsecond fraction, always < 1_000_000.
    pub fn micros(&self) -> u32 {
        self.micros
    }
}

impl fmt::Display for Rev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

impl FromStr for Rev {
    type Err = RevParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RevParseError(s.to_string());
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let secs: i64 = whole.parse().map_err(|_| err())?;
        if secs < 0 || frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let micros = if frac.is_empty() {
            0
        } else {
            // Right-pad to microseconds: ".5" means 500_000us.
            let padded: u32 = frac.parse().map_err(|_| err())?;
            padded * 10u32.pow(6 - frac.len() as u32)
        };
        Ok(Rev::new(secs, micros))
    }
}

impl Serialize for Rev {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct RevVisitor;

impl Visitor<'_> for RevVisitor {
    type Value = Rev;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a revision string like \"1730484792.123456\" or a number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Rev, E> {
        v.parse().map_err(de::Error::custom)
    }

    // Older clients send the revision as a bare JSON number.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Rev, E> {
        if !v.is_finite() || v < 0.0 {
            return Err(de::Error::custom(RevParseError(v.to_string())));
        }
        let secs = v.trunc() as i64;
        let micros = (v.fract() * f64::from(MICROS_PER_SEC)).round() as u32;
        Ok(Rev::new(secs, micros))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Rev, E> {
        Ok(Rev::new(v as i64, 0))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Rev, E> {
        if v < 0 {
            return Err(de::Error::custom(RevParseError(v.to_string())));
        }
        Ok(Rev::new(v, 0))
    }
}

impl<'de> Deserialize<'de> for Rev {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RevVisitor)
    }
}
