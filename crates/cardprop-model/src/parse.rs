//! Text value parsing
//!
//! The same rules apply to interactive edits, bulk edits and import rows.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// How all-numeric dates (`01/07/01`) are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// `mm/dd/yy`
    #[default]
    MonthFirst,
    /// `dd/mm/yy`
    DayFirst,
}

/// Value parsing failures, worded for direct display
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// Unparseable date
    #[error("{raw} is an invalid date. Enter dates in dd mmm yyyy format")]
    InvalidDate { raw: String },

    /// Unparseable number
    #[error("{raw} is an invalid numeric value")]
    InvalidNumber { raw: String },

    /// Free text wrapped in parentheses (reserved for project variables)
    #[error("{raw} is an invalid value. Value cannot both start with '(' and end with ')'")]
    ParenthesizedText { raw: String },

    /// No card with this number
    #[error("{raw} is not a valid card number")]
    InvalidCardNumber { raw: String },

    /// User is not on the project team
    #[error("{raw} is not a project member")]
    NotTeamMember { raw: String },

    /// Locked enumeration does not contain the value
    #[error("{property} is locked and {raw} is not an existing value")]
    LockedValue { property: String, raw: String },

    /// Value longer than allowed
    #[error("value '{raw}' is too long (maximum is {max} characters)")]
    TooLong { raw: String, max: usize },

    /// Value can't be empty
    #[error("value can't be blank")]
    Blank,

    /// Stored values can't be written to computed properties
    #[error("{property} is a computed property and can't be set")]
    Computed { property: String },
}

const NAMED_FORMATS: &[&str] = &[
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%b %d %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y-%m-%d",
];

/// Parse a date in any of the accepted shapes.
///
/// Accepted: `dd mmm yyyy`, `dd month yyyy`, `dd-mmm-yyyy`, `mmm dd yyyy`,
/// `month dd, yyyy`, `yyyy-mm-dd` and slash-separated numeric dates read
/// according to `format`. Two-digit years pivot at 70.
pub fn parse_date(raw: &str, format: DateFormat) -> Result<NaiveDate, ValueError> {
    let text = raw.trim();
    let invalid = || ValueError::InvalidDate {
        raw: text.to_string(),
    };

    if text.contains('/') {
        return parse_slash_date(text, format).ok_or_else(invalid);
    }

    for pattern in NAMED_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, pattern) {
            return pivot_year(date).ok_or_else(invalid);
        }
    }
    Err(invalid())
}

fn parse_slash_date(text: &str, format: DateFormat) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.split('/').map(str::trim).collect();
    let [first, second, year] = parts.as_slice() else {
        return None;
    };
    let first: u32 = first.parse().ok()?;
    let second: u32 = second.parse().ok()?;
    let year_value: i32 = year.parse().ok()?;
    let year = match year.len() {
        1 | 2 => expand_two_digit_year(year_value),
        4 => year_value,
        _ => return None,
    };
    let (month, day) = match format {
        DateFormat::MonthFirst => (first, second),
        DateFormat::DayFirst => (second, first),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn pivot_year(date: NaiveDate) -> Option<NaiveDate> {
    if date.year() < 100 {
        date.with_year(expand_two_digit_year(date.year()))
    } else {
        Some(date)
    }
}

fn expand_two_digit_year(year: i32) -> i32 {
    if year < 70 {
        2000 + year
    } else {
        1900 + year
    }
}

/// Parse a finite number
pub fn parse_number(raw: &str) -> Result<f64, ValueError> {
    let text = raw.trim();
    text.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| ValueError::InvalidNumber {
            raw: text.to_string(),
        })
}

/// Reject free text that looks like a project variable reference
pub fn validate_free_text(raw: &str) -> Result<&str, ValueError> {
    let text = raw.trim();
    if text.starts_with('(') && text.ends_with(')') {
        return Err(ValueError::ParenthesizedText {
            raw: text.to_string(),
        });
    }
    Ok(text)
}

/// Parse a card number written as `12` or `#12`
pub fn parse_card_number(raw: &str) -> Result<u32, ValueError> {
    let text = raw.trim();
    text.strip_prefix('#')
        .unwrap_or(text)
        .parse::<u32>()
        .map_err(|_| ValueError::InvalidCardNumber {
            raw: text.to_string(),
        })
}
