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

//! Typed matchers applied to a message façade.

use chrono::prelude::*;
use chrono::Duration;

use crate::mime::message::Message;

/// One predicate produced by the query parser.
///
/// A message without a parseable date is treated as infinitely old: it
/// satisfies `Before` and `OlderThan` but never `After` or `NewerThan`.
#[derive(Clone, Debug, PartialEq)]
pub enum Matcher {
    /// Any recipient address equals this, case-insensitively.
    Mailbox(String),
    /// The message has at least one attachment.
    Attachment,
    /// Case-sensitive substring of any body version, the subject, the
    /// sender address, or any recipient address.
    PlainText(String),
    Before(DateTime<Utc>),
    After(DateTime<Utc>),
    /// The sender address equals this, case-insensitively.
    From(String),
    NewerThan(Duration),
    OlderThan(Duration),
    /// Case-insensitive substring of the subject.
    Subject(String),
}

impl Matcher {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Matcher::Mailbox(mailbox) => message
                .recipients()
                .iter()
                .any(|r| r.address.eq_ignore_ascii_case(mailbox)),
            Matcher::Attachment => message.has_attachments(),
            Matcher::PlainText(text) => {
                message
                    .body_versions()
                    .into_iter()
                    .any(|version| message.body(version).contains(text))
                    || message.subject().contains(text)
                    || message.sender().address.contains(text)
                    || message
                        .recipients()
                        .iter()
                        .any(|r| r.address.contains(text))
            },
            Matcher::Before(date) => match message_date(message) {
                Some(message_date) => message_date < *date,
                None => true,
            },
            Matcher::After(date) => match message_date(message) {
                Some(message_date) => message_date > *date,
                None => false,
            },
            Matcher::From(from) => {
                message.sender().address.eq_ignore_ascii_case(from)
            },
            Matcher::NewerThan(duration) => match message_date(message) {
                Some(message_date) => Utc::now() - message_date < *duration,
                None => false,
            },
            Matcher::OlderThan(duration) => match message_date(message) {
                Some(message_date) => Utc::now() - message_date > *duration,
                None => true,
            },
            Matcher::Subject(subject) => message
                .subject()
                .to_lowercase()
                .contains(&subject.to_lowercase()),
        }
    }
}

/// Conjunction over all matchers; an empty list matches everything.
pub fn match_all(matchers: &[Matcher], message: &Message) -> bool {
    matchers.iter().all(|m| m.matches(message))
}

fn message_date(message: &Message) -> Option<DateTime<Utc>> {
    message.date().map(|d| d.with_timezone(&Utc))
}
