//! Date-range search queries.
//!
//! The mailbox is searched with the free-text operators
//! `after:YYYY/MM/DD` and `before:YYYY/MM/DD`. A [`DateRange`] is the
//! half-open interval `[start, end)`: a message received on `start` matches,
//! one received on `end` does not.

use std::fmt;

use chrono::NaiveDate;

use crate::error::{ReportError, Result};

/// Half-open calendar date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting an `end` that precedes `start`.
    ///
    /// `start == end` is accepted and matches nothing.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(ReportError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds from user-supplied strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// Whether `date` falls inside the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    /// The mailbox search expression for this range.
    pub fn to_query(&self) -> MailQuery {
        MailQuery {
            after: Some(self.start),
            before: Some(self.end),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// A parsed `after:`/`before:` search expression.
///
/// `after` is inclusive and `before` exclusive, matching the mailbox's own
/// interpretation of calendar-day operators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailQuery {
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

impl MailQuery {
    /// Parse a query string.
    ///
    /// Never fails: unknown tokens and unparseable dates are ignored.
    pub fn parse(input: &str) -> Self {
        let mut query = Self::default();
        for token in input.split_whitespace() {
            if let Some(value) = token.strip_prefix("after:") {
                if let Ok(d) = parse_date(value) {
                    query.after = Some(d);
                }
            } else if let Some(value) = token.strip_prefix("before:") {
                if let Ok(d) = parse_date(value) {
                    query.before = Some(d);
                }
            }
        }
        query
    }

    /// Whether a message received on `date` satisfies the query.
    pub fn matches(&self, date: NaiveDate) -> bool {
        self.after.is_none_or(|a| date >= a) && self.before.is_none_or(|b| date < b)
    }
}

impl fmt::Display for MailQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(a) = self.after {
            parts.push(format!("after:{}", a.format("%Y/%m/%d")));
        }
        if let Some(b) = self.before {
            parts.push(format!("before:{}", b.format("%Y/%m/%d")));
        }
        f.write_str(&parts.join(" "))
    }
}

/// Parse a date written as `YYYY/MM/DD` or `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| ReportError::InvalidDate(s.to_string()))
}
