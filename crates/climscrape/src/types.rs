use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, Local};
use regex::Regex;
use serde::Serialize;

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

static RE_DATE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("invalid regex: date key")
});

#[derive(Debug, thiserror::Error)]
pub enum DateKeyParseError {
    #[error("Invalid date '{0}'. Expected 'YYYY-MM-DD'")]
    InvalidFormat(String),
    #[error("Invalid month {month} in date '{date}'")]
    InvalidMonth { date: String, month: u32 },
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid {field} temperature '{value}'")]
pub struct TemperatureParseError {
    pub field: &'static str,
    pub value: String,
}

/// A calendar month, the unit the climate service pages its daily data by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn current() -> Self {
        let today = Local::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month before this one, rolling January back to December of the previous year.
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn name(&self) -> &'static str {
        MONTH_NAMES[self.month as usize - 1]
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name(), self.year)
    }
}

/// Identifies one day of observations: `year-MM-dayLabel`.
///
/// The day label is the text of the table's day cell. It is expected to be a
/// small integer but is kept verbatim so the parser never has to reject a row
/// on account of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateKey {
    year: i32,
    month: u32,
    day: String,
}

impl DateKey {
    pub fn new(period: YearMonth, day_label: &str) -> Self {
        Self {
            year: period.year,
            month: period.month,
            day: day_label.trim().to_string(),
        }
    }

    pub fn period(&self) -> YearMonth {
        YearMonth {
            year: self.year,
            month: self.month,
        }
    }

    pub fn day_label(&self) -> &str {
        &self.day
    }

    pub fn day_number(&self) -> Option<u32> {
        self.day.parse().ok()
    }

    /// Storage form with a zero-padded day so that text order matches date order.
    ///
    /// `None` when the day label is not a number.
    pub fn sample_date(&self) -> Option<String> {
        self.day_number()
            .map(|day| format!("{}-{:02}-{:02}", self.year, self.month, day))
    }
}

impl Display for DateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}-{}", self.year, self.month, self.day)
    }
}

impl Ord for DateKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.year
            .cmp(&other.year)
            .then(self.month.cmp(&other.month))
            .then_with(|| self.day_number().cmp(&other.day_number()))
            .then_with(|| self.day.cmp(&other.day))
    }
}

impl PartialOrd for DateKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for DateKey {
    type Err = DateKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = RE_DATE_KEY
            .captures(s.trim())
            .ok_or_else(|| DateKeyParseError::InvalidFormat(s.to_string()))?;

        let year: i32 = caps[1]
            .parse()
            .map_err(|_| DateKeyParseError::InvalidFormat(s.to_string()))?;
        let month: u32 = caps[2]
            .parse()
            .map_err(|_| DateKeyParseError::InvalidFormat(s.to_string()))?;

        let period = YearMonth::new(year, month).ok_or_else(|| DateKeyParseError::InvalidMonth {
            date: s.to_string(),
            month,
        })?;

        Ok(DateKey::new(period, &caps[3]))
    }
}

/// One day's temperatures exactly as they appeared in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRecord {
    pub max: String,
    pub min: String,
    pub mean: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperatures {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
}

impl DailyRecord {
    pub fn temperatures(&self) -> Result<Temperatures, TemperatureParseError> {
        let parse = |field: &'static str, value: &str| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| TemperatureParseError {
                    field,
                    value: value.to_string(),
                })
        };

        Ok(Temperatures {
            max: parse("max", &self.max)?,
            min: parse("min", &self.min)?,
            mean: parse("mean", &self.mean)?,
        })
    }
}

/// Every admissible day parsed from one month-page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthlyDataset(BTreeMap<DateKey, DailyRecord>);

impl MonthlyDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: DateKey, record: DailyRecord) -> Option<DailyRecord> {
        self.0.insert(key, record)
    }

    pub fn get(&self, key: &DateKey) -> Option<&DailyRecord> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DateKey> {
        self.0.keys()
    }

    /// Keeps the days strictly after `day`. Keys without a numeric day are dropped.
    pub fn retain_after_day(mut self, day: u32) -> Self {
        self.0
            .retain(|key, _| key.day_number().is_some_and(|d| d > day));
        self
    }
}

impl<'a> IntoIterator for &'a MonthlyDataset {
    type Item = (&'a DateKey, &'a DailyRecord);
    type IntoIter = btree_map::Iter<'a, DateKey, DailyRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(DateKey, DailyRecord)> for MonthlyDataset {
    fn from_iter<I: IntoIterator<Item = (DateKey, DailyRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The outcome of parsing a single month-page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthPage {
    pub title: Option<String>,
    pub dataset: MonthlyDataset,
    /// The page repeats the previously fetched page, so the source has no earlier data.
    pub same_month: bool,
}
