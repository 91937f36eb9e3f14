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

//! The layered storage engine and its layer contract.

pub mod engine;
pub mod filesystem;
pub mod memory;
pub mod sqlite;

use std::collections::BTreeSet;

use chrono::prelude::*;
use serde::Serialize;

use crate::mime::header::{self, HeaderMap};
pub use crate::mime::header::Address as EmailAddress;
pub use crate::mime::message::BodyVersion;
use crate::mime::message::Message;
use crate::search::matcher::match_all;
use crate::search::query::parse_query;
use crate::support::error::Error;

/// A message as the engine hands it to the layers: parsed top-level headers
/// (so the engine can inject `Date`) plus the raw body bytes.
#[derive(Clone, Debug)]
pub struct StoredMessage {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl StoredMessage {
    pub fn parse(raw: &[u8]) -> StoredMessage {
        let (headers, body_start) = header::parse_header_block(raw);
        StoredMessage {
            headers,
            body: raw[body_start..].to_vec(),
        }
    }

    /// Serialise back to wire form: one `Name: value` line per header value
    /// in map order, a blank line, then the body verbatim.
    ///
    /// Header ordering is map-iteration order, not the original wire order;
    /// byte-exact header ordering is not part of the storage contract.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 256);
        for (name, values) in self.headers.entries() {
            for value in values {
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
                out.push(b'\n');
            }
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mailbox {
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct EmailHeader {
    pub id: String,
    pub from: EmailAddress,
    pub tos: Vec<EmailAddress>,
    pub ccs: Vec<EmailAddress>,
    pub subject: String,
    pub date: Option<DateTime<FixedOffset>>,
    pub has_attachments: bool,
    pub preview: String,
    pub body_versions: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AttachmentHeader {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

#[derive(Clone, Debug)]
pub struct Attachment {
    pub header: AttachmentHeader,
    pub data: Vec<u8>,
}

/// The retrieval/mutation contract shared by the engine and every layer.
pub trait Storage: Send + Sync {
    /// The sorted unique set of recipient addresses across all stored
    /// messages.
    fn get_mailboxes(&self) -> Result<Vec<Mailbox>, Error>;

    fn get_email_by_id(&self, email_id: &str) -> Result<EmailHeader, Error>;
    fn delete_all_emails(&self) -> Result<(), Error>;
    fn delete_email_by_id(&self, email_id: &str) -> Result<(), Error>;
    fn get_body_version(
        &self,
        email_id: &str,
        version: BodyVersion,
    ) -> Result<String, Error>;

    fn get_attachments(
        &self,
        email_id: &str,
    ) -> Result<Vec<AttachmentHeader>, Error>;
    fn get_attachment(
        &self,
        email_id: &str,
        attachment_id: &str,
    ) -> Result<Attachment, Error>;

    /// Search with pagination; also returns the total number of matches.
    fn search_emails(
        &self,
        query: &str,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<EmailHeader>, usize), Error>;
}

/// A single physical layer of the engine's stack.
///
/// Any contract method except `load` may fail with the
/// `UnimplementedInLayer` sentinel, which the engine interprets as "pass to
/// the next layer".
pub trait StorageLayer: Storage {
    /// Initialisation callback. `root` is the last (authoritative) layer of
    /// the stack, or `None` when this layer is itself the root.
    fn load(&self, root: Option<&dyn StorageLayer>) -> Result<(), Error>;

    /// Persist a raw message under `email_id`.
    fn set_with_id(
        &self,
        email_id: &str,
        message: &StoredMessage,
    ) -> Result<(), Error>;
}

/// Project a parsed message to the HTTP header summary.
pub(crate) fn email_header_from_message(
    email_id: &str,
    message: &Message,
) -> EmailHeader {
    let mut body_versions: Vec<String> = message
        .body_versions()
        .into_iter()
        .map(|v| v.tag().to_owned())
        .collect();
    body_versions.push(BodyVersion::Raw.tag().to_owned());

    EmailHeader {
        id: email_id.to_owned(),
        from: message.sender(),
        tos: message.tos(),
        ccs: message.ccs(),
        subject: message.subject(),
        date: message.date(),
        has_attachments: message.has_attachments(),
        preview: message.preview(),
        body_versions,
    }
}

pub(crate) fn attachment_headers_from_message(
    message: &Message,
) -> Vec<AttachmentHeader> {
    message
        .attachments()
        .into_iter()
        .enumerate()
        .map(|(ix, part)| AttachmentHeader {
            id: ix.to_string(),
            filename: part.filename(),
            content_type: part
                .headers()
                .get("Content-Type")
                .unwrap_or("text/plain")
                .to_owned(),
            size: part.raw_body().len(),
        })
        .collect()
}

pub(crate) fn attachment_from_message(
    message: &Message,
    attachment_id: &str,
) -> Result<Attachment, Error> {
    let ix: usize = attachment_id
        .parse()
        .map_err(|_| Error::NxAttachment(attachment_id.to_owned()))?;
    let part = message
        .attachment(ix)
        .ok_or_else(|| Error::NxAttachment(attachment_id.to_owned()))?;

    Ok(Attachment {
        header: AttachmentHeader {
            id: attachment_id.to_owned(),
            filename: part.filename(),
            content_type: part
                .headers()
                .get("Content-Type")
                .unwrap_or("text/plain")
                .to_owned(),
            size: part.raw_body().len(),
        },
        data: part.decoded_body().into_owned(),
    })
}

/// Shared search implementation for layers that hold parsed messages:
/// evaluate the query, sort survivors by date descending (undated last),
/// and paginate.
pub(crate) fn search_messages(
    messages: Vec<(String, Message)>,
    query: &str,
    page: i64,
    page_size: i64,
) -> Result<(Vec<EmailHeader>, usize), Error> {
    let matchers = parse_query(query)?;

    let mut headers: Vec<EmailHeader> = messages
        .iter()
        .filter(|(_, message)| match_all(&matchers, message))
        .map(|(id, message)| email_header_from_message(id, message))
        .collect();

    headers.sort_by(|a, b| b.date.cmp(&a.date));

    let total_matches = headers.len();
    let page_items = paginate(headers, page, page_size)?;
    Ok((page_items, total_matches))
}

/// Apply 1-based pagination; a negative page size returns everything.
pub(crate) fn paginate<T>(
    items: Vec<T>,
    page: i64,
    page_size: i64,
) -> Result<Vec<T>, Error> {
    if page < 1 {
        return Err(Error::BadPageNumber(page.to_string()));
    }
    if page_size < 0 {
        return Ok(items);
    }

    let len = items.len();
    let start = usize::min(((page - 1) * page_size) as usize, len);
    let end = usize::min(start + page_size as usize, len);
    Ok(items.into_iter().skip(start).take(end - start).collect())
}

/// Shared mailbox derivation for layers that hold parsed messages.
pub(crate) fn mailboxes_from_messages<'a>(
    messages: impl Iterator<Item = &'a Message>,
) -> Vec<Mailbox> {
    let mut recipients = BTreeSet::new();
    for message in messages {
        for address in message.recipients() {
            recipients.insert(address.address);
        }
    }
    recipients
        .into_iter()
        .map(|name| Mailbox { name })
        .collect()
}
