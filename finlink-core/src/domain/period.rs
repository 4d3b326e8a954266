//! Booking period used to filter transactions

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::Serialize;

use super::transaction::parse_timestamp;

/// Inclusive booking-time window
///
/// The upper bound is widened to the end of its calendar day (UTC), so a
/// bare date like `2024-03-10` covers the whole day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Period {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Period {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// Parse optional textual bounds (see [`parse_bound`])
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, String> {
        let from = from.map(parse_bound).transpose()?;
        let to = to.map(parse_bound).transpose()?;
        let period = Self { from, to };
        if let (Some(f), Some(upper)) = (from, period.upper_bound()) {
            if f > upper {
                return Err(format!(
                    "period start {} is after its end {}",
                    format_bound(&f),
                    format_bound(&upper)
                ));
            }
        }
        Ok(period)
    }

    /// Last instant included by the upper bound
    ///
    /// Bounds are normalised to UTC on parse, so an offset bound ends at the
    /// close of its UTC day.
    pub fn upper_bound(&self) -> Option<DateTime<Utc>> {
        self.to.map(|to| {
            let end_of_day = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
                .unwrap_or(NaiveTime::MIN);
            to.date_naive().and_time(end_of_day).and_utc()
        })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if ts < from {
                return false;
            }
        }
        match self.upper_bound() {
            Some(upper) => ts <= upper,
            None => true,
        }
    }

    /// Query parameters forwarded to the bank with every page request
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(from) = self.from {
            params.push(("from_booking_date_time", format_bound(&from)));
        }
        if let Some(to) = self.to {
            params.push(("to_booking_date_time", format_bound(&to)));
        }
        params
    }
}

/// Parse a period bound: RFC 3339, naive datetime (UTC) or bare date (midnight UTC)
pub fn parse_bound(s: &str) -> Result<DateTime<Utc>, String> {
    if let Some(ts) = parse_timestamp(s) {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| {
            format!(
                "invalid date '{}': expected YYYY-MM-DD or an ISO 8601 timestamp",
                s
            )
        })
}

pub fn format_bound(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
