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

//! The in-memory layer.
//!
//! A write-through cache over the root layer: every mutation reaches it via
//! the engine's fan-out, and `load` hydrates it from the root layer, so a
//! read served here can never miss a write. When it is the only configured
//! layer it is the store of record. Readers proceed in parallel; writers
//! are exclusive.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{
    Attachment, AttachmentHeader, BodyVersion, EmailHeader, Mailbox,
    Storage, StorageLayer, StoredMessage,
};
use crate::mime::message::Message;
use crate::support::error::Error;

pub struct MemoryLayer {
    emails: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryLayer {
    pub fn new() -> Self {
        log::info!("using memory storage");
        MemoryLayer {
            emails: RwLock::new(HashMap::new()),
        }
    }

    fn parse_email(&self, email_id: &str) -> Result<Message, Error> {
        let emails = self.emails.read().unwrap();
        let raw = emails
            .get(email_id)
            .ok_or_else(|| Error::NxEmail(email_id.to_owned()))?;
        Message::parse(raw)
    }

    fn parse_all(&self) -> Result<Vec<(String, Message)>, Error> {
        let emails = self.emails.read().unwrap();
        let mut messages = Vec::with_capacity(emails.len());
        for (email_id, raw) in emails.iter() {
            messages.push((email_id.clone(), Message::parse(raw)?));
        }
        Ok(messages)
    }
}

impl Storage for MemoryLayer {
    fn get_mailboxes(&self) -> Result<Vec<Mailbox>, Error> {
        let messages = self.parse_all()?;
        Ok(super::mailboxes_from_messages(
            messages.iter().map(|(_, m)| m),
        ))
    }

    fn get_email_by_id(&self, email_id: &str) -> Result<EmailHeader, Error> {
        let message = self.parse_email(email_id)?;
        Ok(super::email_header_from_message(email_id, &message))
    }

    fn delete_all_emails(&self) -> Result<(), Error> {
        self.emails.write().unwrap().clear();
        Ok(())
    }

    fn delete_email_by_id(&self, email_id: &str) -> Result<(), Error> {
        match self.emails.write().unwrap().remove(email_id) {
            Some(_) => Ok(()),
            None => Err(Error::NxEmail(email_id.to_owned())),
        }
    }

    fn get_body_version(
        &self,
        email_id: &str,
        version: BodyVersion,
    ) -> Result<String, Error> {
        if version == BodyVersion::Raw {
            let emails = self.emails.read().unwrap();
            let raw = emails
                .get(email_id)
                .ok_or_else(|| Error::NxEmail(email_id.to_owned()))?;
            return Ok(String::from_utf8_lossy(raw).into_owned());
        }
        let message = self.parse_email(email_id)?;
        Ok(message.body(version))
    }

    fn get_attachments(
        &self,
        email_id: &str,
    ) -> Result<Vec<AttachmentHeader>, Error> {
        let message = self.parse_email(email_id)?;
        Ok(super::attachment_headers_from_message(&message))
    }

    fn get_attachment(
        &self,
        email_id: &str,
        attachment_id: &str,
    ) -> Result<Attachment, Error> {
        let message = self.parse_email(email_id)?;
        super::attachment_from_message(&message, attachment_id)
    }

    fn search_emails(
        &self,
        query: &str,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<EmailHeader>, usize), Error> {
        let messages = self.parse_all()?;
        super::search_messages(messages, query, page, page_size)
    }
}

impl StorageLayer for MemoryLayer {
    fn load(&self, root: Option<&dyn StorageLayer>) -> Result<(), Error> {
        let root = match root {
            Some(root) => root,
            None => return Ok(()),
        };

        // Hydrate the cache from the authoritative layer. A root that does
        // not implement enumeration simply leaves the cache to warm up
        // from subsequent writes.
        let headers = match root.search_emails("", 1, -1) {
            Ok((headers, _)) => headers,
            Err(e) if e.is_unimplemented_in_layer() => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut emails = self.emails.write().unwrap();
        for header in headers {
            let raw =
                root.get_body_version(&header.id, BodyVersion::Raw)?;
            emails.insert(header.id, raw.into_bytes());
        }
        log::info!("memory layer hydrated with {} emails", emails.len());
        Ok(())
    }

    fn set_with_id(
        &self,
        email_id: &str,
        message: &StoredMessage,
    ) -> Result<(), Error> {
        self.emails
            .write()
            .unwrap()
            .insert(email_id.to_owned(), message.to_bytes());
        Ok(())
    }
}
