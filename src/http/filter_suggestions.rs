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

//! The search-filter help catalogue behind `/api/filters/suggestions`.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct FilterSyntaxEntry {
    pub command: &'static str,
    pub suggestion: &'static str,
    pub description: &'static str,
}

pub const FILTER_SYNTAX: &[FilterSyntaxEntry] = &[
    FilterSyntaxEntry {
        command: "mailbox",
        suggestion: "mailbox:<name>",
        description: "Search for emails in a specific mailbox.",
    },
    FilterSyntaxEntry {
        command: "has",
        suggestion: "has:attachment",
        description: "Search for emails that have attachments.",
    },
    FilterSyntaxEntry {
        command: "before",
        suggestion: "before:<YYYY-MM-DD>",
        description: "Search for emails received before a specific date.",
    },
    FilterSyntaxEntry {
        command: "after",
        suggestion: "after:<YYYY-MM-DD>",
        description: "Search for emails received after a specific date.",
    },
    FilterSyntaxEntry {
        command: "from",
        suggestion: "from:<email_address>",
        description: "Search for emails from a specific sender.",
    },
    FilterSyntaxEntry {
        command: "subject",
        suggestion: "subject:<text>",
        description: "Search for emails with specific text in the subject.",
    },
    FilterSyntaxEntry {
        command: "older_than",
        suggestion: "older_than:<duration>",
        description: "Search for emails older than a duration (e.g. 7d, \
                      2w, 1month, 1y, or compound forms such as 36h).",
    },
    FilterSyntaxEntry {
        command: "newer_than",
        suggestion: "newer_than:<duration>",
        description: "Search for emails newer than a duration (e.g. 7d, \
                      2w, 1month, 1y, or compound forms such as 36h).",
    },
];

/// With a term: the suggestion strings whose command starts with the term
/// (case-insensitive). Without: the full catalogue.
pub fn suggestions_json(term: Option<&str>) -> Vec<u8> {
    match term {
        Some(term) if !term.is_empty() => {
            let term = term.to_lowercase();
            let suggestions: Vec<&str> = FILTER_SYNTAX
                .iter()
                .filter(|entry| entry.command.starts_with(&term))
                .map(|entry| entry.suggestion)
                .collect();
            serde_json::to_vec(&suggestions).unwrap()
        },
        _ => serde_json::to_vec(FILTER_SYNTAX).unwrap(),
    }
}
