//! Lexical forms of the typed leaf values

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat};
use std::fmt;

use crate::error::{Result, SedaError};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A SEDA date-or-datetime value, keeping the precision it was given with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SedaDateTime {
    Date(NaiveDate),
    Local(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

impl SedaDateTime {
    /// Parse an xs:dateTime with or without offset, or an xs:date
    pub fn parse(element: &str, value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if let Ok(zoned) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(SedaDateTime::Zoned(zoned));
        }
        if let Ok(local) = NaiveDateTime::parse_from_str(trimmed, DATE_TIME_FORMAT) {
            return Ok(SedaDateTime::Local(local));
        }
        parse_date(element, trimmed).map(SedaDateTime::Date)
    }
}

impl fmt::Display for SedaDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SedaDateTime::Date(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            SedaDateTime::Local(local) => write!(f, "{}", local.format(DATE_TIME_FORMAT)),
            SedaDateTime::Zoned(zoned) => {
                write!(f, "{}", zoned.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

/// Parse an xs:date
pub fn parse_date(element: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| SedaError::InvalidValue {
        element: element.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_integer(element: &str, value: &str) -> Result<i64> {
    value.trim().parse::<i64>().map_err(|e| SedaError::InvalidValue {
        element: element.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Check a value against a closed set
pub fn check_enumerated(element: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(SedaError::InvalidEnumValue {
            element: element.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_time_forms() {
        let zoned = SedaDateTime::parse("CreatedDate", "2024-03-01T10:15:00Z").unwrap();
        assert_eq!(zoned.to_string(), "2024-03-01T10:15:00Z");

        let offset = SedaDateTime::parse("CreatedDate", "2024-03-01T10:15:00+01:00").unwrap();
        assert_eq!(offset.to_string(), "2024-03-01T10:15:00+01:00");

        let local = SedaDateTime::parse("CreatedDate", "2024-03-01T10:15:00").unwrap();
        assert_eq!(local.to_string(), "2024-03-01T10:15:00");

        let date = SedaDateTime::parse("CreatedDate", "2024-03-01").unwrap();
        assert!(matches!(date, SedaDateTime::Date(_)));
        assert_eq!(date.to_string(), "2024-03-01");
    }

    #[test]
    fn test_invalid_values() {
        assert!(SedaDateTime::parse("CreatedDate", "yesterday").is_err());
        assert!(parse_integer("GpsAltitude", "12m").is_err());
        assert!(check_enumerated("DescriptionLevel", "Pile", &["Item"]).is_err());
    }
}
