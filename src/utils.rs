use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime};

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .checked_sub_days(Days::new(1))
        .unwrap()
}

/// First day of the calendar month containing `date`.
pub fn month_floor(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap()
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

/// `date` minus `months` whole months, clamped to a valid day.
pub fn months_back(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months)).unwrap_or(date)
}

/// Canonical `YYYY-MM` key for the month containing `date`.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

const MONTH_LABEL_FORMATS: &[&str] = &["%Y-%m-%d", "%B %Y %d", "%b %Y %d", "%B %d, %Y"];

/// Parses a calendar-month label into the first day of that month.
///
/// Accepts `YYYY-MM` (zero-padded or not), full dates, and human-readable
/// labels like "January 2024". Returns `None` for anything unrecognizable;
/// callers decide whether that is fail-open or an exclusion.
pub fn parse_month_label(label: &str) -> Option<NaiveDate> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return None;
    }

    // "YYYY-MM" / "YYYY-M"
    let parts: Vec<&str> = trimmed.split('-').collect();
    if parts.len() == 2 {
        if let (Ok(year), Ok(month)) = (parts[0].parse::<i32>(), parts[1].parse::<u32>()) {
            if (1..=12).contains(&month) {
                return NaiveDate::from_ymd_opt(year, month, 1);
            }
        }
    }

    for format in MONTH_LABEL_FORMATS {
        // Formats with a literal day slot get day 1 appended to the input.
        let candidate = if format.ends_with("%d") && !format.starts_with("%Y") {
            format!("{} 1", trimmed)
        } else {
            trimmed.to_string()
        };
        if let Ok(date) = NaiveDate::parse_from_str(&candidate, format) {
            return Some(month_floor(date));
        }
    }

    None
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d %B %Y"];

/// Best-effort parse of a provider-supplied date string.
///
/// Tries full-date formats first, then RFC 3339 timestamps, then falls back
/// to month-label parsing.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ts.date());
    }
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.date_naive());
    }

    parse_month_label(trimmed)
}
