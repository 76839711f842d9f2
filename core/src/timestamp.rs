//! Parsing of timestamps handed over as text by ingestion glue.

use crate::error::{IndexError, Result};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time};

/// Parse a timestamp given as RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC),
/// `YYYY-MM-DD` (midnight UTC) or fractional Unix seconds.
pub fn parse_timestamp(input: &str) -> Result<OffsetDateTime> {
    let s = input.trim();
    if s.is_empty() {
        return Err(IndexError::malformed_timestamp(input, "empty"));
    }
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(ts);
    }
    let datetime = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(dt) = PrimitiveDateTime::parse(s, &datetime) {
        return Ok(dt.assume_utc());
    }
    let date = format_description!("[year]-[month]-[day]");
    if let Ok(d) = Date::parse(s, &date) {
        return Ok(PrimitiveDateTime::new(d, Time::MIDNIGHT).assume_utc());
    }
    from_unix_seconds(s)
}

/// Fractional Unix seconds, as carried in document file names.
pub fn from_unix_seconds(input: &str) -> Result<OffsetDateTime> {
    let s = input.trim();
    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (secs, nanos) = match split_decimal(unsigned) {
        Some((whole, frac)) => {
            let secs: i64 = whole.parse().map_err(|e| IndexError::malformed_timestamp(input, e))?;
            let digits: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
            let nanos: i64 = digits.parse().map_err(|e| IndexError::malformed_timestamp(input, e))?;
            (secs, nanos)
        }
        None => {
            let value: f64 = unsigned.parse().map_err(|e| IndexError::malformed_timestamp(input, e))?;
            if !value.is_finite() || value >= i64::MAX as f64 {
                return Err(IndexError::malformed_timestamp(input, "not a finite number of seconds"));
            }
            let whole = value.floor();
            (whole as i64, ((value - whole) * 1e9).round() as i64)
        }
    };
    let offset = Duration::new(secs, 0)
        .checked_add(Duration::nanoseconds(nanos))
        .map(|d| if negative { -d } else { d })
        .ok_or_else(|| IndexError::malformed_timestamp(input, "out of range"))?;
    OffsetDateTime::UNIX_EPOCH
        .checked_add(offset)
        .ok_or_else(|| IndexError::malformed_timestamp(input, "out of range"))
}

/// `digits[.digits]`, parsed without going through `f64`.
fn split_decimal(s: &str) -> Option<(&str, &str)> {
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    (!whole.is_empty() && all_digits(whole) && all_digits(frac)).then_some((whole, frac))
}

/// Exact decimal Unix seconds, trailing fractional zeros trimmed: `1709634030.25`, `-1.5`.
pub fn format_unix_seconds(ts: OffsetDateTime) -> String {
    let (mut secs, mut nanos) = (ts.unix_timestamp(), ts.nanosecond());
    let negative = secs < 0;
    if negative && nanos > 0 {
        secs += 1;
        nanos = 1_000_000_000 - nanos;
    }
    let sign = if negative { "-" } else { "" };
    let whole = secs.unsigned_abs();
    if nanos == 0 {
        return format!("{sign}{whole}");
    }
    let frac = format!("{nanos:09}");
    format!("{sign}{whole}.{}", frac.trim_end_matches('0'))
}

pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_default()
}
