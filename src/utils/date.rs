//! UTC datetime utilities without timezone dependencies.
//!
//! Backs the script `datetime` module (`DateTime.Now`, `DateTime.Parse`)
//! and the "rendered at HH:MM:SS" status timestamp.
//!
//! # Examples
//!
//! ```ignore
//! let dt = DateTimeUtc::parse("2024-06-15T14:30:45Z").unwrap();
//! assert_eq!(dt.to_rfc3339(), "2024-06-15T14:30:45Z");
//! assert_eq!(dt.to_date_string(), "2024-06-15");
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Result, bail};

/// UTC datetime without timezone complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeUtc {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTimeUtc {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Current wall-clock time in UTC.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::from_unix(secs)
    }

    /// Convert seconds since the Unix epoch (civil-from-days).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_unix(secs: u64) -> Self {
        let days = (secs / 86_400) as i64;
        let rem = secs % 86_400;

        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
        let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
        let year = (yoe + era * 400 + i64::from(month <= 2)) as u16;

        Self::new(
            year,
            month,
            day,
            (rem / 3600) as u8,
            ((rem / 60) % 60) as u8,
            (rem % 60) as u8,
        )
    }

    /// Parse `YYYY-MM-DD` or an RFC 3339 timestamp.
    ///
    /// Fractional seconds are dropped and `±HH:MM` offsets are normalized to
    /// UTC. `T`/`Z` may be lowercase.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.trim().as_bytes();

        if bytes.len() < 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return None;
        }
        let year = parse_u16(&bytes[0..4])?;
        let month = parse_u8(&bytes[5..7])?;
        let day = parse_u8(&bytes[8..10])?;

        if bytes.len() == 10 {
            let dt = Self::new(year, month, day, 0, 0, 0);
            dt.validate().ok()?;
            return Some(dt);
        }

        if bytes.len() < 20
            || !matches!(bytes[10], b'T' | b't')
            || bytes[13] != b':'
            || bytes[16] != b':'
        {
            return None;
        }
        let hour = parse_u8(&bytes[11..13])?;
        let minute = parse_u8(&bytes[14..16])?;
        let second = parse_u8(&bytes[17..19])?;

        let mut rest = &bytes[19..];
        if let Some(fraction) = rest.strip_prefix(b".") {
            let digits = fraction.iter().take_while(|b| b.is_ascii_digit()).count();
            if digits == 0 {
                return None;
            }
            rest = &fraction[digits..];
        }
        let offset = parse_offset(rest)?;

        let local = Self::new(year, month, day, hour, minute, second);
        local.validate().ok()?;
        if offset == 0 {
            return Some(local);
        }
        let secs = local.unix_seconds() - offset;
        u64::try_from(secs).ok().map(Self::from_unix)
    }

    /// Seconds since the Unix epoch (days-from-civil).
    fn unix_seconds(self) -> i64 {
        let month = i64::from(self.month);
        let year = i64::from(self.year) - i64::from(month <= 2);
        let era = year.div_euclid(400);
        let yoe = year - era * 400;
        let mp = (month + 9) % 12;
        let doy = (153 * mp + 2) / 5 + i64::from(self.day) - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        let days = era * 146_097 + doe - 719_468;

        days * 86_400
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }

    pub fn validate(self) -> Result<()> {
        let Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        } = self;

        if !(1..=12).contains(&month) {
            bail!("month is invalid: {month}");
        }
        let max_days = Self::days_in_month(year, month);
        if day == 0 || day > max_days {
            bail!("day is invalid: {day}");
        }
        if hour > 23 {
            bail!("hour is invalid: {hour}");
        }
        if minute > 59 {
            bail!("minute is invalid: {minute}");
        }
        if second > 59 {
            bail!("second is invalid: {second}");
        }
        Ok(())
    }

    #[inline]
    #[allow(clippy::manual_is_multiple_of)]
    const fn is_leap_year(year: u16) -> bool {
        year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
    }

    #[inline]
    const fn days_in_month(year: u16, month: u8) -> u8 {
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if Self::is_leap_year(year) => 29,
            2 => 28,
            _ => 0,
        }
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`
    pub fn to_rfc3339(self) -> String {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }

    /// `YYYY-MM-DD`
    pub fn to_date_string(self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// `HH:MM:SS`
    pub fn to_time_string(self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// `Z` or `±HH:MM`, as seconds east of UTC.
fn parse_offset(bytes: &[u8]) -> Option<i64> {
    match bytes {
        [b'Z' | b'z'] => Some(0),
        [sign @ (b'+' | b'-'), h1, h2, b':', m1, m2] => {
            let hours = parse_u8(&[*h1, *h2])?;
            let minutes = parse_u8(&[*m1, *m2])?;
            if hours > 23 || minutes > 59 {
                return None;
            }
            let secs = i64::from(hours) * 3600 + i64::from(minutes) * 60;
            Some(if *sign == b'-' { -secs } else { secs })
        }
        _ => None,
    }
}

/// Parse 2-digit ASCII number
#[inline]
fn parse_u8(bytes: &[u8]) -> Option<u8> {
    if bytes.len() != 2 {
        return None;
    }
    let d1 = bytes[0].wrapping_sub(b'0');
    let d2 = bytes[1].wrapping_sub(b'0');
    if d1 > 9 || d2 > 9 {
        return None;
    }
    Some(d1 * 10 + d2)
}

/// Parse 4-digit ASCII number
#[inline]
fn parse_u16(bytes: &[u8]) -> Option<u16> {
    if bytes.len() != 4 {
        return None;
    }
    let mut result = 0u16;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        result = result * 10 + u16::from(d);
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_only() {
        let dt = DateTimeUtc::parse("2024-06-15").unwrap();
        assert_eq!(dt, DateTimeUtc::new(2024, 6, 15, 0, 0, 0));
        assert_eq!(dt.to_date_string(), "2024-06-15");
    }

    #[test]
    fn test_parse_rfc3339() {
        let dt = DateTimeUtc::parse("2024-06-15T14:30:45Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-15T14:30:45Z");
        assert_eq!(dt.to_time_string(), "14:30:45");
    }

    #[test]
    fn test_parse_fraction_and_lowercase() {
        let dt = DateTimeUtc::parse("2024-06-15T14:30:45.123Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-15T14:30:45Z");
        let dt = DateTimeUtc::parse("2024-06-15t14:30:45z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-15T14:30:45Z");
        assert!(DateTimeUtc::parse("2024-06-15T14:30:45.Z").is_none());
    }

    #[test]
    fn test_parse_offset_normalizes_to_utc() {
        let dt = DateTimeUtc::parse("2024-06-15T14:30:45+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-15T12:30:45Z");
        let dt = DateTimeUtc::parse("2024-12-31T23:30:00.5-01:15").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-01T00:45:00Z");
        let dt = DateTimeUtc::parse("2024-03-01T01:00:00+03:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-02-29T22:00:00Z");
        assert!(DateTimeUtc::parse("2024-06-15T14:30:45+2:00").is_none());
        assert!(DateTimeUtc::parse("2024-06-15T14:30:45+24:00").is_none());
        assert!(DateTimeUtc::parse("2024-06-15T14:30:45").is_none());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(DateTimeUtc::parse("2024-13-01").is_none());
        assert!(DateTimeUtc::parse("2023-02-29").is_none());
        assert!(DateTimeUtc::parse("2024-06-15T25:00:00Z").is_none());
        assert!(DateTimeUtc::parse("15.06.2024").is_none());
        assert!(DateTimeUtc::parse("").is_none());
    }

    #[test]
    fn test_leap_day() {
        assert!(DateTimeUtc::parse("2024-02-29").is_some());
        assert!(DateTimeUtc::parse("2000-02-29").is_some());
        assert!(DateTimeUtc::parse("1900-02-29").is_none());
    }

    #[test]
    fn test_from_unix() {
        assert_eq!(
            DateTimeUtc::from_unix(0),
            DateTimeUtc::new(1970, 1, 1, 0, 0, 0)
        );
        // 2024-06-15T14:30:45Z
        assert_eq!(
            DateTimeUtc::from_unix(1_718_461_845).to_rfc3339(),
            "2024-06-15T14:30:45Z"
        );
        // 2024-02-29T00:00:00Z
        assert_eq!(
            DateTimeUtc::from_unix(1_709_164_800).to_date_string(),
            "2024-02-29"
        );
    }
}
