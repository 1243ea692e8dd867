//! Calendar periods used to bucket statistics.
//!
//! Statistics are always computed per calendar month. A year is never
//! computed directly from commits: it is the sum of its month buckets.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    /// Month containing the given date.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or_else(|| self.first_day())
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The month `n` months before this one.
    pub fn minus(&self, n: u32) -> Self {
        self.first_day()
            .checked_sub_months(Months::new(n))
            .map(Self::of)
            .unwrap_or(*self)
    }

    /// Index used for month arithmetic (months since year 0).
    fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    /// Whole calendar months from `earlier` to `self` (negative if `earlier` is later).
    pub fn months_since(&self, earlier: Month) -> i64 {
        self.ordinal() - earlier.ordinal()
    }

    /// Inclusive range of months. Empty when `from > to`.
    pub fn range(from: Month, to: Month) -> Vec<Month> {
        let mut months = Vec::new();
        let mut cur = from;
        while cur <= to {
            months.push(cur);
            cur = cur.next();
        }
        months
    }

    /// Folder label: `YYYY-MM-DD_YYYY-MM-DD`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.first_day(), self.last_day())
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = String;

    /// Accepts `YYYY-MM` or a full `YYYY-MM-DD` date.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Month::of(date));
        }
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| format!("'{}' is not a month (expected YYYY-MM)", s))?;
        let year: i32 = y
            .parse()
            .map_err(|_| format!("'{}' has an invalid year", s))?;
        let month: u32 = m
            .parse()
            .map_err(|_| format!("'{}' has an invalid month", s))?;
        Month::new(year, month).ok_or_else(|| format!("'{}' is not a valid month", s))
    }
}

/// A statistics period: a calendar month or a full year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    Month(Month),
    Year(i32),
}

impl Period {
    pub fn is_yearly(&self) -> bool {
        matches!(self, Period::Year(_))
    }

    pub fn year(&self) -> i32 {
        match self {
            Period::Month(m) => m.year,
            Period::Year(y) => *y,
        }
    }

    pub fn from_date(&self) -> NaiveDate {
        match self {
            Period::Month(m) => m.first_day(),
            Period::Year(y) => NaiveDate::from_ymd_opt(*y, 1, 1).unwrap_or(NaiveDate::MIN),
        }
    }

    pub fn to_date(&self) -> NaiveDate {
        match self {
            Period::Month(m) => m.last_day(),
            Period::Year(y) => NaiveDate::from_ymd_opt(*y, 12, 31).unwrap_or(NaiveDate::MAX),
        }
    }

    /// Folder label: `YYYY-MM-DD_YYYY-MM-DD`. Years always span Jan 1 to Dec 31.
    pub fn label(&self) -> String {
        format!("{}_{}", self.from_date(), self.to_date())
    }

    /// Parse a folder label back into a period.
    pub fn from_label(label: &str) -> Option<Self> {
        let (from, to) = label.split_once('_')?;
        let from = NaiveDate::parse_from_str(from, "%Y-%m-%d").ok()?;
        let to = NaiveDate::parse_from_str(to, "%Y-%m-%d").ok()?;
        let month = Month::of(from);
        if from == month.first_day() && to == month.last_day() {
            return Some(Period::Month(month));
        }
        let year = Period::Year(from.year());
        (from == year.from_date() && to == year.to_date()).then_some(year)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Month(m) => write!(f, "{}", m),
            Period::Year(y) => write!(f, "{:04}", y),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    /// Accepts `YYYY` (a year), `YYYY-MM` (a month) or a folder label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(p) = Period::from_label(s) {
            return Ok(p);
        }
        if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
            return s
                .parse()
                .map(Period::Year)
                .map_err(|_| format!("'{}' is not a year", s));
        }
        s.parse::<Month>().map(Period::Month)
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Period::from_label(&label)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid period label '{}'", label)))
    }
}

/// The `n` most recent months ending with (and including) `as_of`'s month.
pub fn trailing_months(as_of: NaiveDate, n: u32) -> Vec<Month> {
    let end = Month::of(as_of);
    if n == 0 {
        return Vec::new();
    }
    Month::range(end.minus(n - 1), end)
}

/// Months of `year` that have started by `today`: the full year for past
/// years, January through the current month for the current year.
pub fn months_to_date(year: i32, today: NaiveDate) -> Vec<Month> {
    let first = Month { year, month: 1 };
    let last = if year < today.year() {
        Month { year, month: 12 }
    } else if year == today.year() {
        Month::of(today)
    } else {
        return Vec::new();
    };
    Month::range(first, last)
}
