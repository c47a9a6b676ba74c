//! Date windows for the sender + date search.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{MailgrabError, Result};

/// Length of the range selected relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Month,
    Year,
}

/// Which period, counting back from today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relative {
    #[default]
    Current,
    Previous,
}

/// Inclusive range of days `[start, end]`.
///
/// IMAP compares dates by day and its `BEFORE` is exclusive, so the
/// search uses [`since`](Self::since) and [`before`](Self::before) (the day
/// after `end`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl SearchWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(MailgrabError::InvalidWindow(format!(
                "window ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// The whole calendar month `month` (1-12) of `year`.
    pub fn month(year: i32, month: u32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| MailgrabError::InvalidWindow(format!("no such month: {year}-{month:02}")))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let end = next
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| MailgrabError::InvalidWindow(format!("month out of range: {year}-{month:02}")))?;
        Self::new(start, end)
    }

    /// The whole calendar year.
    pub fn year(year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1);
        let end = NaiveDate::from_ymd_opt(year, 12, 31);
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Err(MailgrabError::InvalidWindow(format!("year out of range: {year}"))),
        }
    }

    /// The current or previous month/year as seen from `today`.
    pub fn relative(period: Period, relative: Relative, today: NaiveDate) -> Result<Self> {
        match (period, relative) {
            (Period::Month, Relative::Current) => Self::month(today.year(), today.month()),
            (Period::Month, Relative::Previous) => {
                if today.month() == 1 {
                    Self::month(today.year() - 1, 12)
                } else {
                    Self::month(today.year(), today.month() - 1)
                }
            }
            (Period::Year, Relative::Current) => Self::year(today.year()),
            (Period::Year, Relative::Previous) => Self::year(today.year() - 1),
        }
    }

    /// First day of the window (IMAP `SINCE`, inclusive).
    pub fn since(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the window, inclusive.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Day after the window (IMAP `BEFORE`, exclusive).
    pub fn before(&self) -> NaiveDate {
        self.end.succ_opt().unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

impl std::fmt::Display for SearchWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// IMAP `date` syntax: `01-Mar-2024`.
pub fn imap_date(day: NaiveDate) -> String {
    day.format("%d-%b-%Y").to_string()
}

/// The server-side filter for messages from `sender` received in `[since, before)`.
pub fn search_query(sender: &str, since: NaiveDate, before: NaiveDate) -> String {
    let sender = sender.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "FROM \"{sender}\" SINCE {} BEFORE {}",
        imap_date(since),
        imap_date(before)
    )
}
