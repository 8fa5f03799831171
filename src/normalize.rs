//! Per-field canonicalization.
//!
//! Every normalizer is total: unusable input yields an empty string / `None`
//! rather than an error, and the scorers treat that as "no signal".

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use phonenumber::Mode;
use regex::Regex;
use std::sync::OnceLock;

/// Honorifics dropped from names.
pub const NAME_PREFIXES: [&str; 6] = ["mr", "mrs", "ms", "miss", "dr", "prof"];
/// Generational suffixes dropped from names.
pub const NAME_SUFFIXES: [&str; 6] = ["jr", "sr", "ii", "iii", "iv", "v"];
/// Calling codes tried, in order, when a phone number is not explicitly international.
pub const PHONE_COUNTRY_CODES: [&str; 3] = ["1", "44", "91"];

/// Date layouts accepted for date-only values. Month-first precedes
/// day-first for ambiguous slash dates. Every `%Y` here must match a
/// four-digit year; see [`has_full_year`].
const DATE_FORMATS: [&str; 18] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y%m%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d-%B-%Y",
    "%d-%b-%Y",
    "%d %b, %Y",
];

/// Two-digit-year layouts, tried only after every four-digit layout.
/// `%y` puts 70-99 in the 1900s and 00-69 in the 2000s.
const SHORT_YEAR_FORMATS: [&str; 6] = [
    "%m/%d/%y",
    "%d/%m/%y",
    "%m-%d-%y",
    "%d-%m-%y",
    "%d.%m.%y",
    "%d-%b-%y",
];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn name_strip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9\s\-]").expect("static name regex"))
}

fn email_regex() -> &'static Regex {
    // RFC 5322 simplified: local@domain.tld
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("static email regex")
    })
}

/// Normalize a person name: lowercase, collapse whitespace, strip everything
/// outside `[a-z0-9 -]` and drop honorific/suffix tokens.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let cleaned = name_strip_regex().replace_all(&lowered, "");

    cleaned
        .split_whitespace()
        .filter(|token| !NAME_PREFIXES.contains(token) && !NAME_SUFFIXES.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// chrono's `%Y` also accepts one to three digits, so "11/11/74" would
/// otherwise parse as year 74 and "Nov 1974" as the 19th of year 74.
/// A four-digit layout only counts when the year is written out in full.
fn has_full_year(raw: &str, date: NaiveDate) -> bool {
    (1000..=9999).contains(&date.year()) && raw.contains(&date.year().to_string())
}

/// Parse a date in any supported layout.
///
/// Partial dates such as "Nov 1974" are rejected.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let full_year = DATE_FORMATS
        .iter()
        .filter_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .chain(
            DATETIME_FORMATS
                .iter()
                .filter_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
                .map(|datetime| datetime.date()),
        )
        .chain(
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive()),
        )
        .find(|date| has_full_year(trimmed, *date));
    if full_year.is_some() {
        return full_year;
    }

    SHORT_YEAR_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Normalize a date to `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_date(raw).map(|date| date.format("%Y-%m-%d").to_string())
}

/// Normalize a phone number to E.164.
///
/// An explicitly international number (`+...` or `00...`) is parsed as
/// written first; otherwise each of [`PHONE_COUNTRY_CODES`] is prefixed in
/// turn and the first valid parse wins.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let trimmed = raw.trim_start();
    let explicit = if trimmed.starts_with('+') {
        Some(digits.as_str())
    } else {
        digits.strip_prefix("00").filter(|_| trimmed.starts_with("00"))
    };

    let mut candidates: Vec<String> = Vec::with_capacity(PHONE_COUNTRY_CODES.len() + 1);
    if let Some(international) = explicit {
        candidates.push(format!("+{}", international));
    }
    candidates.extend(
        PHONE_COUNTRY_CODES
            .iter()
            .map(|code| format!("+{}{}", code, digits)),
    );

    for candidate in candidates {
        match phonenumber::parse(None, &candidate) {
            Ok(number) if phonenumber::is_valid(&number) => {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::trace!("✓ Valid phone: {} → {}", raw, formatted);
                return Some(formatted);
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::trace!("Phone candidate '{}' did not parse: {:?}", candidate, e);
                continue;
            }
        }
    }

    None
}

/// Validate and normalize an email address: the domain is lowercased, the
/// local part is kept as written.
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() < 5 || !email_regex().is_match(trimmed) {
        return None;
    }

    let (local, domain) = trimmed.rsplit_once('@')?;
    let tld = domain.rsplit('.').next()?;
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    Some(format!("{}@{}", local, domain.to_lowercase()))
}

/// Normalize an identifier: lowercase ASCII alphanumerics only.
pub fn normalize_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
