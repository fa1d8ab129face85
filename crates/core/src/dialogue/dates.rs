//! Deterministic resolution of date phrases into absolute calendar dates.
//!
//! Anything that cannot be pinned to a single day resolves to `None`; callers
//! treat that as a missing value and ask again instead of storing the phrase.

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};

use crate::errors::DomainError;

const MONTHS: [(&str, u32); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

pub fn resolve_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let phrase = normalize(raw);
    if phrase.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(&phrase, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&phrase, "%Y/%m/%d") {
        return Some(date);
    }

    let words = phrase.split_whitespace().collect::<Vec<_>>();
    match words.as_slice() {
        ["today"] | ["now"] => Some(today),
        ["tomorrow"] => today.succ_opt(),
        ["yesterday"] => today.pred_opt(),
        ["day", "after", "tomorrow"] => Some(today + Duration::days(2)),
        ["next", "week"] => Some(today + Duration::days(7)),
        ["next", "month"] => today.checked_add_months(Months::new(1)),
        ["in", count, unit] | ["in", count, unit, "time"] => offset(today, count, unit),
        [count, unit, "from", "now"] | [count, unit, "from", "today"] => {
            offset(today, count, unit)
        }
        [word] => weekday(word).map(|day| upcoming(today, day)),
        ["this", word] | ["coming", word] | ["this", "coming", word] => {
            weekday(word).map(|day| upcoming(today, day))
        }
        ["next", word] => weekday(word).map(|day| next_weekday(today, day)),
        ["last", word] | ["previous", word] => weekday(word).map(|day| previous(today, day)),
        _ => month_day(&words, today),
    }
}

/// Parses a stored `YYYY-MM-DD` value. Anything else, including phrases that
/// `resolve_date` would understand, is rejected.
pub fn parse_absolute(raw: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| DomainError::RelativeDate { value: raw.trim().to_string() })
}

fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    let lowered = lowered.strip_prefix("on ").unwrap_or(&lowered);
    let lowered = lowered.strip_prefix("by ").unwrap_or(lowered);
    lowered
        .chars()
        .map(|ch| if ch == ',' || ch == '.' { ' ' } else { ch })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn offset(today: NaiveDate, count: &str, unit: &str) -> Option<NaiveDate> {
    let count = match count {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        other => other.parse::<i64>().ok()?,
    };
    match unit.trim_end_matches('s') {
        "day" => today.checked_add_signed(Duration::try_days(count)?),
        "week" => today.checked_add_signed(Duration::try_weeks(count)?),
        "month" => u32::try_from(count).ok().and_then(|n| today.checked_add_months(Months::new(n))),
        _ => None,
    }
}

fn weekday(word: &str) -> Option<Weekday> {
    let day = match word {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

/// Today, or the first matching weekday after it.
fn upcoming(today: NaiveDate, day: Weekday) -> NaiveDate {
    let ahead = (day.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    today + Duration::days(i64::from(ahead))
}

/// "next Friday" means the Friday of next week when said earlier in the same
/// week, otherwise the first Friday after today.
fn next_weekday(today: NaiveDate, day: Weekday) -> NaiveDate {
    let mut candidate = upcoming(today, day);
    if candidate == today {
        candidate += Duration::days(7);
    }
    if candidate.iso_week() == today.iso_week() {
        candidate += Duration::days(7);
    }
    candidate
}

fn previous(today: NaiveDate, day: Weekday) -> NaiveDate {
    let back = (today.weekday().num_days_from_monday() + 7 - day.num_days_from_monday()) % 7;
    let back = if back == 0 { 7 } else { back };
    today - Duration::days(i64::from(back))
}

fn month(word: &str) -> Option<u32> {
    if word.len() < 3 {
        return None;
    }
    MONTHS.iter().find(|(prefix, _)| word.starts_with(prefix)).map(|(_, number)| *number)
}

fn day_of_month(word: &str) -> Option<u32> {
    let digits = word.trim_end_matches(|ch: char| ch.is_ascii_alphabetic());
    if digits.is_empty() || digits.len() == word.len() && word.len() > 2 {
        return None;
    }
    let day = digits.parse::<u32>().ok()?;
    (1..=31).contains(&day).then_some(day)
}

/// `July 18`, `18 July`, `18th of July 2025`, `Jul 18 2025`. A month-day without a
/// year is the next occurrence on or after today.
fn month_day(words: &[&str], today: NaiveDate) -> Option<NaiveDate> {
    let words =
        words.iter().copied().filter(|word| *word != "of" && *word != "the").collect::<Vec<_>>();
    let (month_word, day_word, year_word) = match words.as_slice() {
        [m, d] if month(m).is_some() => (*m, *d, None),
        [d, m] if month(m).is_some() => (*m, *d, None),
        [m, d, y] if month(m).is_some() => (*m, *d, Some(*y)),
        [d, m, y] if month(m).is_some() => (*m, *d, Some(*y)),
        _ => return None,
    };
    let month = month(month_word)?;
    let day = day_of_month(day_word)?;
    let year = match year_word {
        Some(raw) => Some(raw.parse::<i32>().ok()?),
        None => None,
    };

    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
            match this_year {
                Some(date) if date >= today => Some(date),
                _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
            }
        }
    }
}
