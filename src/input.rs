// Parsing and validation of user-supplied values: dates, URLs and URL lists.

use crate::error::{BwmError, Result};
use chrono::{Duration, NaiveDate};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use url::Url;

/// Length of the range used when `--start-date` is omitted.
pub const DEFAULT_RANGE_DAYS: i64 = 30;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// An inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Apply the defaults: end = `today`, start = end - `DEFAULT_RANGE_DAYS`.
    pub fn resolve(start: Option<&str>, end: Option<&str>, today: NaiveDate) -> Result<Self> {
        let end = match end {
            Some(raw) => parse_date(raw)?,
            None => today,
        };
        let start = match start {
            Some(raw) => parse_date(raw)?,
            None => end - Duration::days(DEFAULT_RANGE_DAYS),
        };
        if start > end {
            return Err(BwmError::validation("start-date cannot be after end-date"));
        }
        Ok(DateRange { start, end })
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        BwmError::validation(format!("Invalid date '{value}'. Expected YYYY-MM-DD."))
    })
}

/// Accept only absolute http(s) URLs.
pub fn parse_http_url(value: &str) -> Result<Url> {
    let invalid = || BwmError::validation(format!("Invalid URL '{value}'. Expected http(s)://..."));
    let url = Url::parse(value.trim()).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(invalid()),
    }
}

/// Merge `--url` values with the lines of `--file`, dropping blanks,
/// `#` comments and duplicates while keeping first-seen order.
pub fn collect_urls(urls: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut items: Vec<String> = urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(path) = file {
        let raw = fs::read_to_string(path).map_err(|e| {
            BwmError::validation(format!("Cannot read URL file {}: {e}", path.display()))
        })?;
        items.extend(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }

    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
    Ok(items)
}
