//! Git dates and identity signatures.
//!
//! Commits and tags carry `Name <email> timestamp tz` triples. The timestamp
//! is seconds since the Unix epoch; the zone is stored as an offset in
//! minutes and rendered in git's `+hhmm` decimal form.

use bstr::{BStr, BString, ByteSlice};
use chrono::{Local, Offset, TimeZone};

use crate::{Result, UtilError};

/// A git date: UTC instant plus the zone it was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GitDate {
    /// Seconds since Unix epoch.
    pub timestamp: i64,
    /// Timezone offset in minutes from UTC (e.g. -300 for EST).
    pub tz_offset: i32,
}

/// Convert git's `+hhmm` decimal form (parsed as an integer, so `-0500`
/// becomes `-500`) to minutes.
fn tz_decimal_to_minutes(tz: i32) -> i32 {
    let sign = if tz < 0 { -1 } else { 1 };
    let abs = tz.abs();
    sign * ((abs / 100) * 60 + abs % 100)
}

/// Convert minutes to the `+hhmm` decimal form.
fn minutes_to_tz_decimal(minutes: i32) -> i32 {
    let sign = if minutes < 0 { -1 } else { 1 };
    let abs = minutes.abs();
    sign * ((abs / 60) * 100 + abs % 60)
}

impl GitDate {
    pub fn new(timestamp: i64, tz_offset_minutes: i32) -> Self {
        Self {
            timestamp,
            tz_offset: tz_offset_minutes,
        }
    }

    /// The current time in the local timezone.
    pub fn now() -> Self {
        let now = Local::now();
        let offset_secs = now.offset().fix().local_minus_utc();
        Self {
            timestamp: now.timestamp(),
            tz_offset: offset_secs / 60,
        }
    }

    /// Parse git's raw format: `timestamp +hhmm` (or a bare timestamp,
    /// which is taken as UTC).
    pub fn parse_raw(input: &str) -> Result<Self> {
        let input = input.trim();
        let mut parts = input.splitn(2, ' ');

        let ts_str = parts.next().unwrap_or("");
        let timestamp: i64 = ts_str
            .parse()
            .map_err(|_| UtilError::DateParse(format!("invalid timestamp: '{ts_str}'")))?;

        let tz_offset = match parts.next() {
            Some(tz_str) => {
                let tz_str = tz_str.trim();
                let tz: i32 = tz_str
                    .parse()
                    .map_err(|_| UtilError::DateParse(format!("invalid timezone: '{tz_str}'")))?;
                tz_decimal_to_minutes(tz)
            }
            None => 0,
        };

        Ok(Self {
            timestamp,
            tz_offset,
        })
    }

    /// Render in git's raw format: `timestamp +hhmm`.
    pub fn to_raw(&self) -> String {
        format!("{} {:+05}", self.timestamp, minutes_to_tz_decimal(self.tz_offset))
    }

    /// The instant as seen by `chrono`, if representable.
    pub fn to_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::Utc.timestamp_opt(self.timestamp, 0).single()
    }
}

/// An identity attached to a commit or tag: who, and when.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub date: GitDate,
}

impl Signature {
    /// Parse git's signature format: `Name <email> timestamp tz`.
    pub fn parse(input: &BStr) -> Result<Self> {
        let input = input.as_bytes();

        let gt_pos = input
            .iter()
            .rposition(|&b| b == b'>')
            .ok_or_else(|| UtilError::DateParse("missing '>' in signature".into()))?;
        let lt_pos = input[..gt_pos]
            .iter()
            .rposition(|&b| b == b'<')
            .ok_or_else(|| UtilError::DateParse("missing '<' in signature".into()))?;

        let name = input[..lt_pos].trim();
        let email = &input[lt_pos + 1..gt_pos];

        let date_str = input[gt_pos + 1..].trim();
        let date_str = std::str::from_utf8(date_str)
            .map_err(|_| UtilError::DateParse("non-UTF-8 date in signature".into()))?;
        let date = GitDate::parse_raw(date_str)?;

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            date,
        })
    }

    /// Render in git's canonical signature format.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::from(Vec::new());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(self.date.to_raw().as_bytes());
        out
    }
}
