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

//! Utilities for working with RFC 5322 headers.

use chrono::prelude::*;
use serde::Serialize;

/// A case-insensitive, multi-valued header map.
///
/// Entries keep their insertion order and the spelling of the first
/// occurrence of each name; lookups are case-insensitive. Callers never see
/// the raw representation.
#[derive(Clone, Debug, Default)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

const NO_VALUES: &[String] = &[];

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap::default()
    }

    /// Append a value for `name`, creating the entry if needed.
    pub fn add(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, values)) => values.push(value.to_owned()),
            None => self
                .entries
                .push((name.to_owned(), vec![value.to_owned()])),
        }
    }

    /// Replace all values of `name` with the single given value.
    pub fn set(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, values)) => {
                values.clear();
                values.push(value.to_owned());
            },
            None => self
                .entries
                .push((name.to_owned(), vec![value.to_owned()])),
        }
    }

    /// The first value of `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(|s| s.as_str())
    }

    /// All values of `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(NO_VALUES)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Iterate `(name, values)` entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(n, values)| (n.as_str(), values.as_slice()))
    }
}

/// Parse a header block from the start of `data`.
///
/// Continuation lines are unfolded; lines that cannot be split on a colon
/// are skipped. Returns the map and the offset at which the body begins
/// (after the blank separator line, or the end of input if there is none).
pub fn parse_header_block(data: &[u8]) -> (HeaderMap, usize) {
    let mut headers = HeaderMap::new();
    let mut buffered: Option<(String, String)> = None;
    let mut ix = 0;

    while ix < data.len() {
        let line_end = memchr::memchr(b'\n', &data[ix..])
            .map(|n| ix + n + 1)
            .unwrap_or(data.len());
        let raw_line = &data[ix..line_end];
        let line = trim_line_ending(raw_line);

        if line.is_empty() {
            // Blank line: end of headers, body follows
            ix = line_end;
            break;
        }

        if line.starts_with(b" ") || line.starts_with(b"\t") {
            // Continuation of the previous header
            if let Some((_, value)) = buffered.as_mut() {
                value.push(' ');
                value.push_str(
                    String::from_utf8_lossy(line).trim_start(),
                );
            }
        } else {
            if let Some((name, value)) = buffered.take() {
                headers.add(&name, &value);
            }
            let mut split = line.splitn(2, |&b| b':' == b);
            match (split.next(), split.next()) {
                (Some(name), Some(value)) => {
                    let name =
                        String::from_utf8_lossy(name).trim().to_owned();
                    let value =
                        String::from_utf8_lossy(value).trim().to_owned();
                    buffered = Some((name, value));
                },
                // Not a header line; skip it
                _ => (),
            }
        }

        ix = line_end;
    }

    if let Some((name, value)) = buffered {
        headers.add(&name, &value);
    }

    (headers, ix)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    if line.ends_with(b"\r\n") {
        &line[..line.len() - 2]
    } else if line.ends_with(b"\n") {
        &line[..line.len() - 1]
    } else {
        line
    }
}

/// A parsed Content-Type value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    /// Lowercased media type, e.g. `text`.
    pub typ: String,
    /// Lowercased subtype, e.g. `plain`.
    pub subtype: String,
    pub parms: Vec<(String, String)>,
}

impl ContentType {
    /// `type/subtype`, lowercased.
    pub fn full_type(&self) -> String {
        format!("{}/{}", self.typ, self.subtype)
    }

    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ)
    }

    pub fn parm(&self, name: &str) -> Option<&str> {
        self.parms
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text_plain() -> Self {
        ContentType {
            typ: "text".to_owned(),
            subtype: "plain".to_owned(),
            parms: vec![],
        }
    }
}

/// Parse a Content-Type header value into media type and parameters.
///
/// Parameter values may be quoted; quoting and backslash escapes are
/// removed. Returns `None` when there is no `type/subtype` to speak of.
pub fn parse_content_type(value: &str) -> Option<ContentType> {
    let mut segments = split_unquoted(value, ';');
    let media_type = segments.next()?.trim().to_ascii_lowercase();
    let (typ, subtype) = media_type.split_once('/')?;
    if typ.is_empty() || subtype.is_empty() {
        return None;
    }

    let mut parms = Vec::new();
    for segment in segments {
        let segment = segment.trim();
        if let Some((name, value)) = segment.split_once('=') {
            parms.push((
                name.trim().to_ascii_lowercase(),
                unquote(value.trim()),
            ));
        }
    }

    Some(ContentType {
        typ: typ.to_owned(),
        subtype: subtype.to_owned(),
        parms,
    })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentTransferEncoding {
    #[default]
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
}

pub fn parse_content_transfer_encoding(
    value: &str,
) -> Option<ContentTransferEncoding> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("7bit") {
        Some(ContentTransferEncoding::SevenBit)
    } else if value.eq_ignore_ascii_case("8bit") {
        Some(ContentTransferEncoding::EightBit)
    } else if value.eq_ignore_ascii_case("binary") {
        Some(ContentTransferEncoding::Binary)
    } else if value.eq_ignore_ascii_case("base64") {
        Some(ContentTransferEncoding::Base64)
    } else if value.eq_ignore_ascii_case("quoted-printable") {
        Some(ContentTransferEncoding::QuotedPrintable)
    } else {
        None
    }
}

/// Parse an RFC 5322 date header value.
///
/// Returns `None` on anything unparseable; email in the wild is hostile and
/// the callers all have a lenient default.
pub fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt);
    }
    // Without the optional day-of-week
    DateTime::parse_from_str(value, "%d %b %Y %H:%M:%S %z").ok()
}

/// Format a date the way injected `Date` headers are written (RFC 1123 with
/// a numeric zone).
pub fn format_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

/// A mailbox as it appears in an address header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Address {
    pub name: String,
    pub address: String,
}

/// Parse a single address, falling back to `{ "", s }` when the input does
/// not look like an address. Never fails.
pub fn parse_address(value: &str) -> Address {
    parse_one_address(value).unwrap_or_else(|| Address {
        name: String::new(),
        address: value.to_owned(),
    })
}

/// Parse a comma-separated address list. Returns an empty list when nothing
/// parses. Never fails.
pub fn parse_address_list(value: &str) -> Vec<Address> {
    split_unquoted(value, ',')
        .filter_map(|item| parse_one_address(item))
        .collect()
}

fn parse_one_address(item: &str) -> Option<Address> {
    let item = item.trim();
    if item.is_empty() {
        return None;
    }

    if let Some(lt) = item.find('<') {
        let gt = item[lt + 1..].find('>')?;
        let address = item[lt + 1..lt + 1 + gt].trim().to_owned();
        let name = unquote(item[..lt].trim());
        return Some(Address { name, address });
    }

    // Bare address: drop any trailing comment
    let bare = match item.find('(') {
        Some(paren) => item[..paren].trim(),
        None => item,
    };
    if bare.is_empty() || bare.contains(char::is_whitespace) {
        return None;
    }
    Some(Address {
        name: String::new(),
        address: bare.to_owned(),
    })
}

/// Split on `sep`, ignoring separators inside double quotes or angle
/// brackets.
fn split_unquoted(value: &str, sep: char) -> impl Iterator<Item = &str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut in_angle = false;

    for (ix, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            c if c == sep && !in_quotes && !in_angle => {
                items.push(&value[start..ix]);
                start = ix + c.len_utf8();
            },
            _ => (),
        }
    }
    items.push(&value[start..]);
    items.into_iter()
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\")
    } else {
        value.to_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_map_case_insensitive_multi_valued() {
        let mut h = HeaderMap::new();
        h.add("Received", "a");
        h.add("RECEIVED", "b");
        h.add("Subject", "s");

        assert_eq!(Some("a"), h.get("received"));
        assert_eq!(2, h.get_all("Received").len());
        assert_eq!(Some("s"), h.get("SUBJECT"));
        assert!(h.contains("subject"));
        assert!(!h.contains("from"));
        assert!(h.get("From").is_none());

        h.set("Date", "d1");
        h.set("date", "d2");
        assert_eq!(&["d2".to_owned()] as &[String], h.get_all("Date"));
    }

    #[test]
    fn parse_headers_with_continuations() {
        const DATA: &[u8] = b"Subject: hello\r\n\
              X-Long: first\r\n\
              \tsecond\r\n\
              From: a@example.com\r\n\
              \r\n\
              body";
        let (h, body_start) = parse_header_block(DATA);
        assert_eq!(Some("hello"), h.get("subject"));
        assert_eq!(Some("first second"), h.get("x-long"));
        assert_eq!(Some("a@example.com"), h.get("from"));
        assert_eq!(b"body", &DATA[body_start..]);
    }

    #[test]
    fn parse_headers_without_body() {
        let data = b"Subject: only\n";
        let (h, body_start) = parse_header_block(data);
        assert_eq!(Some("only"), h.get("Subject"));
        assert_eq!(data.len(), body_start);
    }

    #[test]
    fn parse_headers_skips_garbage_lines() {
        let (h, _) =
            parse_header_block(b"garbage line\nSubject: ok\n\nbody");
        assert_eq!(Some("ok"), h.get("Subject"));
    }

    #[test]
    fn content_type_parsing() {
        let ct = parse_content_type(
            "multipart/Mixed; boundary=\"simple boundary\"; charset=utf-8",
        )
        .unwrap();
        assert!(ct.is_type("multipart"));
        assert_eq!("mixed", ct.subtype);
        assert_eq!("multipart/mixed", ct.full_type());
        assert_eq!(Some("simple boundary"), ct.parm("Boundary"));
        assert_eq!(Some("utf-8"), ct.parm("charset"));

        assert_eq!(None, parse_content_type("not-a-type"));
        assert_eq!(None, parse_content_type(""));
    }

    #[test]
    fn content_transfer_encoding_parsing() {
        assert_eq!(
            Some(ContentTransferEncoding::Base64),
            parse_content_transfer_encoding("BASE64")
        );
        assert_eq!(
            Some(ContentTransferEncoding::QuotedPrintable),
            parse_content_transfer_encoding("Quoted-Printable")
        );
        assert_eq!(
            Some(ContentTransferEncoding::SevenBit),
            parse_content_transfer_encoding("7bit")
        );
        assert_eq!(None, parse_content_transfer_encoding("x-zip"));
    }

    #[test]
    fn datetime_parsing() {
        let dt = parse_datetime("Tue, 1 Jul 2003 10:52:37 +0200").unwrap();
        assert_eq!(2003, dt.year());
        assert!(parse_datetime("1 Jul 2003 10:52:37 +0200").is_some());
        assert!(parse_datetime("not-a-date").is_none());
        assert!(parse_datetime("").is_none());
    }

    #[test]
    fn datetime_round_trip() {
        let now = Utc::now();
        let parsed = parse_datetime(&format_datetime(&now)).unwrap();
        assert_eq!(now.timestamp(), parsed.timestamp());
    }

    #[test]
    fn address_parsing() {
        assert_eq!(
            Address {
                name: "Alice".to_owned(),
                address: "alice@example.com".to_owned(),
            },
            parse_address("Alice <alice@example.com>")
        );
        assert_eq!(
            Address {
                name: "Last, First".to_owned(),
                address: "lf@example.com".to_owned(),
            },
            parse_address("\"Last, First\" <lf@example.com>")
        );
        assert_eq!(
            Address {
                name: String::new(),
                address: "bob@example.com".to_owned(),
            },
            parse_address("bob@example.com")
        );
        // Fallback: input returned verbatim as the address
        assert_eq!(
            Address {
                name: String::new(),
                address: "not an address".to_owned(),
            },
            parse_address("not an address")
        );
    }

    #[test]
    fn address_list_parsing() {
        let list = parse_address_list(
            "\"Last, First\" <lf@example.com>, bob@example.com, \
             Carol <carol@example.com>",
        );
        assert_eq!(3, list.len());
        assert_eq!("lf@example.com", list[0].address);
        assert_eq!("Last, First", list[0].name);
        assert_eq!("bob@example.com", list[1].address);
        assert_eq!("carol@example.com", list[2].address);

        assert!(parse_address_list("").is_empty());
        assert!(parse_address_list("   ,  , ").is_empty());
    }
}
