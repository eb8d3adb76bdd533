//! Datetime range handling for catalog queries.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CommonError;

/// Which end of an interval a bare date is parsed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Start,
    End,
}

/// An inclusive datetime interval, either end possibly open.
///
/// Parsed from `"A/B"` where each side is an RFC 3339 datetime, a naive
/// datetime (taken as UTC), a date, or `..` for an open end. A bare date on
/// the end side covers that whole day. A single instant without a separator
/// is a degenerate interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, CommonError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(CommonError::EmptyDateRange {
                    start: s.to_rfc3339_opts(SecondsFormat::Secs, true),
                    end: e.to_rfc3339_opts(SecondsFormat::Secs, true),
                });
            }
        }
        Ok(Self { start, end })
    }

    /// Parse `"A/B"`, `"A/.."`, `"../B"` or a single instant.
    pub fn parse(s: &str) -> Result<Self, CommonError> {
        let s = s.trim();
        match s.split_once('/') {
            Some((start, end)) => {
                let start = parse_edge(start, Edge::Start)?;
                let end = parse_edge(end, Edge::End)?;
                if start.is_none() && end.is_none() {
                    return Err(CommonError::InvalidTime(format!(
                        "both ends of '{}' are open",
                        s
                    )));
                }
                Self::new(start, end)
            }
            None => {
                let start = parse_edge(s, Edge::Start)?;
                let end = parse_edge(s, Edge::End)?;
                if start.is_none() {
                    return Err(CommonError::InvalidTime(s.to_string()));
                }
                Self::new(start, end)
            }
        }
    }

    /// Check whether an instant falls inside the interval (inclusive).
    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *dt >= s) && self.end.map_or(true, |e| *dt <= e)
    }

    /// Check whether the closed interval `[start, end]` intersects this one.
    pub fn overlaps(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *end >= s) && self.end.map_or(true, |e| *start <= e)
    }

    /// STAC `datetime` parameter form: RFC 3339 instants, `..` for open ends.
    pub fn to_stac_string(&self) -> String {
        format!("{}/{}", format_edge(self.start), format_edge(self.end))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_stac_string())
    }
}

/// Parse an ISO-8601 datetime as UTC.
///
/// Accepts RFC 3339, `%Y-%m-%dT%H:%M:%S` (assumed UTC) and bare dates
/// (midnight UTC).
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CommonError> {
    match parse_edge(s, Edge::Start)? {
        Some(dt) => Ok(dt),
        None => Err(CommonError::InvalidTime(s.to_string())),
    }
}

fn parse_edge(s: &str, edge: Edge) -> Result<Option<DateTime<Utc>>, CommonError> {
    let s = s.trim();
    if s.is_empty() || s == ".." {
        return Ok(None);
    }

    // Try full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    // Try without timezone (assume UTC)
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Some(Utc.from_utc_datetime(&ndt)));
        }
    }

    // Try date only
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let time = match edge {
            Edge::Start => date.and_hms_opt(0, 0, 0),
            Edge::End => date.and_hms_milli_opt(23, 59, 59, 999),
        };
        if let Some(ndt) = time {
            return Ok(Some(Utc.from_utc_datetime(&ndt)));
        }
    }

    Err(CommonError::InvalidTime(s.to_string()))
}

fn format_edge(edge: Option<DateTime<Utc>>) -> String {
    match edge {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        None => "..".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_date_range() {
        let range = DateRange::parse("2030-01-01/2030-12-31").unwrap();
        let start = range.start.unwrap();
        let end = range.end.unwrap();
        assert_eq!((start.year(), start.month(), start.day()), (2030, 1, 1));
        assert_eq!(start.hour(), 0);
        assert_eq!((end.month(), end.day(), end.hour()), (12, 31, 23));
    }

    #[test]
    fn test_open_ended() {
        let range = DateRange::parse("2020-06-01T12:00:00Z/..").unwrap();
        assert!(range.end.is_none());
        assert_eq!(range.to_stac_string(), "2020-06-01T12:00:00Z/..");
        assert!(DateRange::parse("../..").is_err());
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let err = DateRange::parse("2031-01-01/2030-01-01").unwrap_err();
        assert!(matches!(err, CommonError::EmptyDateRange { .. }));
    }

    #[test]
    fn test_single_day_covers_whole_day() {
        let range = DateRange::parse("2030-05-05").unwrap();
        let noon = Utc.with_ymd_and_hms(2030, 5, 5, 12, 0, 0).unwrap();
        let next = Utc.with_ymd_and_hms(2030, 5, 6, 0, 0, 0).unwrap();
        assert!(range.contains(&noon));
        assert!(!range.contains(&next));
    }

    #[test]
    fn test_overlaps_is_inclusive() {
        let range = DateRange::parse("2030-01-01/2030-12-31").unwrap();
        let a = Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let c = Utc.with_ymd_and_hms(2029, 12, 31, 23, 59, 59).unwrap();
        assert!(range.overlaps(&a, &b));
        assert!(!range.overlaps(&a, &c));
    }
}
