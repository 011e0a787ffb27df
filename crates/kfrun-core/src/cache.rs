//! Per-job cache staleness directive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::CompileError;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// How old a cached result the orchestrator may reuse for one job.
///
/// Zero means "always recompute". Any other value is passed through for the
/// orchestrator to interpret. The default is zero, since job inputs (raw
/// data under a stable path, code) can change in ways the orchestrator's
/// content hash cannot see.
///
/// Serialized as an ISO-8601 duration (`P0D`, `PT1H`, `P7D`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheDirective {
    max_staleness: Duration,
}

impl CacheDirective {
    /// Never reuse a cached result.
    pub const fn never_reuse() -> Self {
        Self {
            max_staleness: Duration::ZERO,
        }
    }

    /// Allow reuse of results up to `max_staleness` old.
    ///
    /// Sub-second precision is dropped.
    pub fn max_staleness(max_staleness: Duration) -> Self {
        Self {
            max_staleness: Duration::from_secs(max_staleness.as_secs()),
        }
    }

    /// The configured staleness bound.
    pub fn staleness(&self) -> Duration {
        self.max_staleness
    }

    /// Returns true if the orchestrator may reuse a previous result.
    pub fn allows_reuse(&self) -> bool {
        !self.max_staleness.is_zero()
    }

    /// Render as an ISO-8601 duration.
    pub fn to_iso8601(&self) -> String {
        let total = self.max_staleness.as_secs();
        if total == 0 {
            return "P0D".to_string();
        }

        let days = total / SECS_PER_DAY;
        let hours = (total % SECS_PER_DAY) / SECS_PER_HOUR;
        let minutes = (total % SECS_PER_HOUR) / SECS_PER_MINUTE;
        let seconds = total % SECS_PER_MINUTE;

        let mut out = String::from("P");
        if days > 0 {
            out.push_str(&format!("{days}D"));
        }
        if hours > 0 || minutes > 0 || seconds > 0 {
            out.push('T');
            if hours > 0 {
                out.push_str(&format!("{hours}H"));
            }
            if minutes > 0 {
                out.push_str(&format!("{minutes}M"));
            }
            if seconds > 0 {
                out.push_str(&format!("{seconds}S"));
            }
        }
        out
    }

    /// Parse an ISO-8601 duration with day, hour, minute and second parts.
    pub fn parse_iso8601(input: &str) -> Result<Self, CompileError> {
        let invalid = || CompileError::InvalidCacheDirective(input.to_string());

        let body = input.strip_prefix('P').ok_or_else(invalid)?;
        if body.is_empty() {
            return Err(invalid());
        }

        let (date_part, time_part) = match body.split_once('T') {
            Some((d, t)) if !t.is_empty() => (d, Some(t)),
            Some(_) => return Err(invalid()),
            None => (body, None),
        };

        let mut total = sum_components(date_part, &[('W', 7 * SECS_PER_DAY), ('D', SECS_PER_DAY)])
            .ok_or_else(invalid)?;
        if let Some(time) = time_part {
            let time_secs = sum_components(
                time,
                &[('H', SECS_PER_HOUR), ('M', SECS_PER_MINUTE), ('S', 1)],
            )
            .ok_or_else(invalid)?;
            total = total.checked_add(time_secs).ok_or_else(invalid)?;
        }

        Ok(Self {
            max_staleness: Duration::from_secs(total),
        })
    }
}

/// Sum `<n><unit>` components, requiring units in the given order.
fn sum_components(mut part: &str, units: &[(char, u64)]) -> Option<u64> {
    let mut total = 0u64;
    let mut next_unit = 0;

    while !part.is_empty() {
        let digits = part.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        let value: u64 = part[..digits].parse().ok()?;
        let unit = part[digits..].chars().next()?;

        let offset = units[next_unit..].iter().position(|(u, _)| *u == unit)?;
        let (_, scale) = units[next_unit + offset];
        next_unit += offset + 1;

        total = total.checked_add(value.checked_mul(scale)?)?;
        part = &part[digits + unit.len_utf8()..];
    }

    Some(total)
}

impl fmt::Display for CacheDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl FromStr for CacheDirective {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_iso8601(s)
    }
}

impl TryFrom<String> for CacheDirective {
    type Error = CompileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_iso8601(&value)
    }
}

impl From<CacheDirective> for String {
    fn from(value: CacheDirective) -> Self {
        value.to_iso8601()
    }
}
