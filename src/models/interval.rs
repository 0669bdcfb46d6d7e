use chrono::{DateTime, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ACCEPTED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// A half-open time interval `[start, end)` at whole-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    /// Sub-second parts are dropped so the interval matches what storage keeps.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start: start.trunc_subsecs(0),
            end: end.trunc_subsecs(0),
        }
    }

    pub fn is_well_ordered(&self) -> bool {
        self.start < self.end
    }

    #[inline]
    pub fn overlaps(&self, other: &Interval) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }
}

/// Half-open overlap test. Touching endpoints (`a_end == b_start`) do not overlap.
#[inline]
pub fn overlaps(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Normalizes a client-supplied timestamp. Offsets are converted to UTC and
/// fractional seconds are truncated.
pub fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
    let s = s.trim();
    for format in ACCEPTED_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt.trunc_subsecs(0));
        }
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc().trunc_subsecs(0))
        .map_err(|_| anyhow::anyhow!("invalid date-time: {s}"))
}

pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}
