//-
// Copyright (c) 2026, The Mockmta Authors
//
// This file is part of Mockmta.
//
// Mockmta is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mockmta is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along
// with Mockmta. If not, see <http://www.gnu.org/licenses/>.

//! Search query parser.
//!
//! Parses a free-form query string into a list of typed matchers combined
//! by conjunction:
//!
//! - `mailbox:<addr>` — delivered to a recipient address
//! - `has:attachment` — carries at least one attachment
//! - `before:<YYYY-MM-DD>` / `after:<YYYY-MM-DD>` — date bounds
//! - `from:<addr>` — sender address
//! - `subject:<text>` — subject substring
//! - `older_than:<duration>` / `newer_than:<duration>` — age bounds with
//!   `7d` / `2w` / `1month` / `1y` shorthands and compound durations
//!   (`1h30m`, `500ms`)
//! - bare words and `"quoted phrases"` — plain-text search

use chrono::prelude::*;
use chrono::Duration;
use lazy_static::lazy_static;
use regex::Regex;

use super::matcher::Matcher;
use crate::support::error::Error;

lazy_static! {
    // key:"quoted value" | key:value | "quoted phrase" | bare word
    static ref TOKEN: Regex =
        Regex::new(r#"(\w+:\s*"[^"]+"|\w+:\s*\S+|"[^"]+"|\S+)"#).unwrap();
    static ref CUSTOM_DURATIONS: Vec<(Regex, i64)> = vec![
        (Regex::new(r"^(\d+)\s*(d|day|days)$").unwrap(), 24),
        (Regex::new(r"^(\d+)\s*(w|week|weeks)$").unwrap(), 24 * 7),
        (Regex::new(r"^(\d+)\s*(month|months)$").unwrap(), 24 * 30),
        (Regex::new(r"^(\d+)\s*(y|year|years)$").unwrap(), 24 * 365),
    ];
}

const DATE_LAYOUT: &str = "%Y-%m-%d";

/// Extract the matchers from a query string.
///
/// An empty query yields an empty matcher list, which matches everything.
pub fn parse_query(query: &str) -> Result<Vec<Matcher>, Error> {
    let invalid = |reason: String| Error::InvalidQuery {
        query: query.to_owned(),
        reason,
    };

    let (key_values, plain_texts) = tokenize_query(query);

    let mut matchers = Vec::new();
    for (key, value) in key_values {
        match key.as_str() {
            "mailbox" => {
                log::debug!("searching for mailbox {}", value);
                matchers.push(Matcher::Mailbox(value));
            },
            "has" => match value.as_str() {
                "attachment" => {
                    log::debug!("searching for emails with attachments");
                    matchers.push(Matcher::Attachment);
                },
                _ => {
                    return Err(invalid(format!(
                        "unknown search attribute for 'has': {}",
                        value
                    )))
                },
            },
            "before" => {
                let date = parse_query_date(&value).ok_or_else(|| {
                    invalid(format!("invalid date format: {}", value))
                })?;
                matchers.push(Matcher::Before(date));
            },
            "after" => {
                let date = parse_query_date(&value).ok_or_else(|| {
                    invalid(format!("invalid date format: {}", value))
                })?;
                matchers.push(Matcher::After(date));
            },
            "from" => {
                log::debug!("searching for emails from {}", value);
                matchers.push(Matcher::From(value));
            },
            "older_than" => {
                let duration =
                    parse_custom_duration(&value).ok_or_else(|| {
                        invalid(format!("invalid duration format: {}", value))
                    })?;
                matchers.push(Matcher::OlderThan(duration));
            },
            "newer_than" => {
                let duration =
                    parse_custom_duration(&value).ok_or_else(|| {
                        invalid(format!("invalid duration format: {}", value))
                    })?;
                matchers.push(Matcher::NewerThan(duration));
            },
            "subject" => {
                log::debug!("searching for emails with subject {}", value);
                matchers.push(Matcher::Subject(value));
            },
            _ => {
                return Err(invalid(format!("unknown search key: {}", key)))
            },
        }
    }

    for text in plain_texts {
        if text.is_empty() {
            continue;
        }
        matchers.push(Matcher::PlainText(text));
    }

    Ok(matchers)
}

fn parse_query_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(value, DATE_LAYOUT)
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

/// Parse a duration in the query shorthand (`7d`, `2w`, `1month`, `1y`) or
/// compound notation (`36h`, `1h30m`, `500ms`, `1.5h`).
pub fn parse_custom_duration(value: &str) -> Option<Duration> {
    for (re, hour_multiplier) in CUSTOM_DURATIONS.iter() {
        if let Some(captures) = re.captures(value) {
            let count: i64 = captures.get(1).unwrap().as_str().parse().ok()?;
            return Some(Duration::hours(count * hour_multiplier));
        }
    }
    parse_compound_duration(value)
}

/// Compound duration notation: a sequence of decimal values with unit
/// suffixes `ns`, `us`, `ms`, `s`, `m`, `h`.
fn parse_compound_duration(value: &str) -> Option<Duration> {
    let mut rest = value.trim();
    if rest.is_empty() {
        return None;
    }

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let (nanos_per_unit, unit_len) = if rest.starts_with("ns") {
            (1f64, 2)
        } else if rest.starts_with("us") {
            (1e3, 2)
        } else if rest.starts_with("µs") {
            (1e3, "µs".len())
        } else if rest.starts_with("ms") {
            (1e6, 2)
        } else if rest.starts_with('s') {
            (1e9, 1)
        } else if rest.starts_with('m') {
            (60e9, 1)
        } else if rest.starts_with('h') {
            (3600e9, 1)
        } else {
            return None;
        };
        rest = &rest[unit_len..];

        total_nanos += number * nanos_per_unit;
    }

    Some(Duration::nanoseconds(total_nanos as i64))
}

/// Tokenize the query into key/value pairs and plain text terms.
fn tokenize_query(query: &str) -> (Vec<(String, String)>, Vec<String>) {
    let mut key_values = Vec::new();
    let mut plain_texts = Vec::new();

    for token in TOKEN.find_iter(query).map(|m| m.as_str()) {
        if let Some(split_ix) = token.find(':') {
            let key = &token[..split_ix];
            let value = token[split_ix + 1..].trim();
            let value = if value.starts_with('"') && value.ends_with('"') {
                value.trim_matches('"')
            } else {
                value
            };
            key_values.push((key.to_owned(), value.to_owned()));
        } else if token.starts_with('"') && token.ends_with('"') {
            plain_texts.push(token.trim_matches('"').to_owned());
        } else {
            plain_texts.push(token.to_owned());
        }
    }

    (key_values, plain_texts)
}
