//! Start/end tokens of the capture window.
//!
//! All times are UTC and minute-precise. Accepted tokens are `now`, `hhmm`
//! (today) and `YYYYMMDDhhmm`; the end additionally accepts `max`.

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

/// When screenshots are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// One round right away, then exit.
    Immediate,
    /// Rounds from `start` while the clock has not passed `end`.
    Scheduled {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// The resolved end token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Now,
    At(DateTime<Utc>),
}

/// Truncates to the full minute.
pub fn floor_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// The latest representable end, used for `max`.
pub fn max_end() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now` starts at the next full minute, or the one after if less than a second is left.
fn next_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let next_minute = floor_minute(now) + Duration::minutes(1);
    if next_minute - now < Duration::seconds(1) {
        next_minute + Duration::minutes(1)
    } else {
        next_minute
    }
}

fn parse_clock(token: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let bytes = token.as_bytes();
    if !bytes.iter().all(u8::is_ascii_digit) {
        bail!("'{}' is not numeric", token);
    }
    match token.len() {
        4 => {
            let hour: u32 = token[0..2].parse()?;
            let minute: u32 = token[2..4].parse()?;
            let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                bail!("'{}' is not a valid time of day", token);
            };
            Ok(now.date_naive().and_time(time).and_utc())
        }
        12 => match NaiveDateTime::parse_from_str(token, "%Y%m%d%H%M") {
            Ok(dt) => Ok(dt.and_utc()),
            Err(e) => bail!("'{}' is not a valid date and time: {}", token, e),
        },
        _ => bail!("'{}' has to be 4 or 12 characters long", token),
    }
}

/// Parses the start token and rejects starts in the past.
pub fn parse_start(token: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let start = if token.eq_ignore_ascii_case("now") {
        next_start(now)
    } else {
        match parse_clock(token, now) {
            Ok(start) => start,
            Err(e) => bail!("WRONG INPUT: start_datetime {}", e),
        }
    };

    if start < now {
        bail!("WRONG INPUT: start_datetime needs to be NOW or in the future!");
    }
    Ok(start)
}

fn parse_end(token: &str, now: DateTime<Utc>) -> Result<End> {
    if token.eq_ignore_ascii_case("now") {
        return Ok(End::Now);
    }
    let end = if token.eq_ignore_ascii_case("max") {
        max_end()
    } else {
        match parse_clock(token, now) {
            Ok(end) => end,
            Err(e) => bail!("WRONG INPUT: end_datetime {}", e),
        }
    };

    if end <= now {
        bail!("WRONG INPUT: end_datetime needs to be in the future!");
    }
    Ok(End::At(end))
}

/// Resolves the start and end tokens against the current time.
pub fn resolve(start: &str, end: &str, now: DateTime<Utc>) -> Result<TimeWindow> {
    let start = parse_start(start, now)?;
    match parse_end(end, now)? {
        End::Now => Ok(TimeWindow::Immediate),
        End::At(end) if end < start => {
            bail!("WRONG INPUT: end_datetime {} is before start_datetime {}", end, start)
        }
        End::At(end) => Ok(TimeWindow::Scheduled { start, end }),
    }
}

/// Picks start/end tokens from 0, 1 or 2 positional arguments, falling back to configured ones.
pub fn select_tokens<'a>(
    args: &'a [String],
    cfg_start: &'a str,
    cfg_end: &'a str,
) -> Result<(&'a str, &'a str)> {
    match args {
        [] => Ok((cfg_start, cfg_end)),
        [start] => Ok((start.as_str(), cfg_end)),
        [start, end] => Ok((start.as_str(), end.as_str())),
        _ => bail!("Please enter 1, 2 or NO command line argument(s)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn now_starts_at_next_minute() {
        let now = at(2025, 6, 1, 12, 30, 15);
        assert_eq!(parse_start("now", now).unwrap(), at(2025, 6, 1, 12, 31, 0));
    }

    #[test]
    fn now_skips_a_minute_when_less_than_a_second_is_left() {
        let now = at(2025, 6, 1, 12, 30, 59) + Duration::milliseconds(500);
        assert_eq!(parse_start("now", now).unwrap(), at(2025, 6, 1, 12, 32, 0));
    }

    #[test]
    fn hhmm_is_today() {
        let now = at(2025, 6, 1, 12, 30, 15);
        assert_eq!(parse_start("1845", now).unwrap(), at(2025, 6, 1, 18, 45, 0));
    }

    #[test]
    fn full_datetime() {
        let now = at(2025, 6, 1, 12, 30, 15);
        assert_eq!(
            parse_start("202507040930", now).unwrap(),
            at(2025, 7, 4, 9, 30, 0)
        );
    }

    #[test]
    fn rejects_past_start() {
        let now = at(2025, 6, 1, 12, 30, 15);
        let err = parse_start("1200", now).unwrap_err();
        assert!(err.to_string().contains("NOW or in the future"));
    }

    #[test]
    fn rejects_malformed_tokens() {
        let now = at(2025, 6, 1, 12, 30, 15);
        assert!(parse_start("123", now).is_err());
        assert!(parse_start("12a5", now).is_err());
        assert!(parse_start("2561", now).is_err());
        assert!(parse_start("202513010000", now).is_err());
        assert!(resolve("now", "soon", now).is_err());
    }

    #[test]
    fn end_now_is_immediate() {
        let now = at(2025, 6, 1, 12, 30, 15);
        assert_eq!(resolve("now", "now", now).unwrap(), TimeWindow::Immediate);
    }

    #[test]
    fn end_max() {
        let now = at(2025, 6, 1, 12, 30, 15);
        assert_eq!(
            resolve("now", "max", now).unwrap(),
            TimeWindow::Scheduled {
                start: at(2025, 6, 1, 12, 31, 0),
                end: at(9999, 12, 31, 23, 59, 0),
            }
        );
    }

    #[test]
    fn rejects_end_in_the_past_or_before_start() {
        let now = at(2025, 6, 1, 12, 30, 15);
        assert!(resolve("now", "1230", now).is_err());
        assert!(resolve("1500", "1400", now).is_err());
        assert!(resolve("1400", "1500", now).is_ok());
    }

    #[test]
    fn positional_tokens() {
        let none: Vec<String> = vec![];
        assert_eq!(select_tokens(&none, "now", "max").unwrap(), ("now", "max"));

        let one = vec!["1200".to_string()];
        assert_eq!(select_tokens(&one, "now", "max").unwrap(), ("1200", "max"));

        let two = vec!["1200".to_string(), "1300".to_string()];
        assert_eq!(select_tokens(&two, "now", "max").unwrap(), ("1200", "1300"));

        let three = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!(select_tokens(&three, "now", "max").is_err());
    }

    #[test]
    fn floors_to_minute() {
        let t = at(2025, 6, 1, 12, 30, 15) + Duration::milliseconds(250);
        assert_eq!(floor_minute(t), at(2025, 6, 1, 12, 30, 0));
    }
}
