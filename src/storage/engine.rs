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

//! The layered engine.
//!
//! Layers are stacked in configuration order; the last layer is the root
//! (authoritative) one. Mutations fan out to every layer in declared order;
//! reads go to the first layer that implements them. A layer signals "I
//! don't implement this" with the `UnimplementedInLayer` sentinel, which
//! never escapes the engine.

use chrono::prelude::*;
use chrono::SecondsFormat;
use uuid::Uuid;

use super::filesystem::FilesystemLayer;
use super::memory::MemoryLayer;
use super::sqlite::SqliteLayer;
use super::{
    Attachment, AttachmentHeader, BodyVersion, EmailHeader, Mailbox,
    Storage, StorageLayer, StoredMessage,
};
use crate::mime::header;
use crate::support::error::Error;
use crate::support::system_config::StorageLayerConfig;

pub struct Engine {
    layers: Vec<Box<dyn StorageLayer>>,
}

impl Engine {
    /// Instantiate the configured layers in declared order and `load` them
    /// from last to first, passing the root (last) layer to every non-root
    /// layer.
    pub fn new(configs: &[StorageLayerConfig]) -> Result<Engine, Error> {
        let mut layers: Vec<Box<dyn StorageLayer>> = Vec::new();
        for config in configs {
            match config {
                StorageLayerConfig::Memory => {
                    layers.push(Box::new(MemoryLayer::new()))
                },
                StorageLayerConfig::Sqlite { database } => {
                    layers.push(Box::new(SqliteLayer::new(database)?))
                },
                StorageLayerConfig::Filesystem { folder, format } => {
                    layers.push(Box::new(FilesystemLayer::new(
                        folder.clone(),
                        *format,
                    )))
                },
            }
        }
        Engine::from_layers(layers)
    }

    pub fn from_layers(
        layers: Vec<Box<dyn StorageLayer>>,
    ) -> Result<Engine, Error> {
        let engine = Engine { layers };
        engine.load()?;
        Ok(engine)
    }

    fn load(&self) -> Result<(), Error> {
        if self.layers.is_empty() {
            return Err(Error::NoStorageLayers);
        }

        let (others, root) = self.layers.split_at(self.layers.len() - 1);
        let root = &root[0];
        root.load(None)?;
        for layer in others.iter().rev() {
            layer.load(Some(root.as_ref()))?;
        }
        Ok(())
    }

    /// Store a raw message, generating its identifier.
    ///
    /// A missing `Date` header is injected as the current wall time; an
    /// unparseable one is overwritten with it. The id is
    /// `<RFC3339 date>-<UUIDv4>` so that directory listings sort
    /// chronologically.
    pub fn set(&self, raw: &[u8]) -> Result<String, Error> {
        let mut message = StoredMessage::parse(raw);

        if !message.headers.contains("Date") {
            let now: DateTime<FixedOffset> = Local::now().into();
            message.headers.set("Date", &header::format_datetime(&now));
        }
        // The header exists now; overwrite it if it does not parse
        let date: DateTime<FixedOffset> = match message
            .headers
            .get("Date")
            .and_then(header::parse_datetime)
        {
            Some(date) => date,
            None => {
                let now: DateTime<FixedOffset> = Local::now().into();
                message
                    .headers
                    .set("Date", &header::format_datetime(&now));
                now
            },
        };

        let email_id = format!(
            "{}-{}",
            date.to_rfc3339_opts(SecondsFormat::Secs, false),
            Uuid::new_v4()
        );
        self.set_with_id(&email_id, &message)?;
        Ok(email_id)
    }

    /// Persist under a caller-chosen id: fan out to every layer in order,
    /// skipping layers that don't implement writes, aborting on the first
    /// real error.
    pub fn set_with_id(
        &self,
        email_id: &str,
        message: &StoredMessage,
    ) -> Result<(), Error> {
        for layer in &self.layers {
            match layer.set_with_id(email_id, message) {
                Err(e) if e.is_unimplemented_in_layer() => continue,
                Err(e) => return Err(e),
                Ok(()) => (),
            }
        }
        Ok(())
    }

    /// First layer that implements the method is authoritative.
    fn first_implementing<T>(
        &self,
        method: &'static str,
        f: impl Fn(&dyn StorageLayer) -> Result<T, Error>,
    ) -> Result<T, Error> {
        for layer in &self.layers {
            match f(layer.as_ref()) {
                Err(e) if e.is_unimplemented_in_layer() => continue,
                other => return other,
            }
        }
        Err(Error::NoLayerImplements(method))
    }
}

impl Storage for Engine {
    fn get_mailboxes(&self) -> Result<Vec<Mailbox>, Error> {
        self.first_implementing("get_mailboxes", |l| l.get_mailboxes())
    }

    fn get_email_by_id(&self, email_id: &str) -> Result<EmailHeader, Error> {
        self.first_implementing("get_email_by_id", |l| {
            l.get_email_by_id(email_id)
        })
    }

    fn delete_all_emails(&self) -> Result<(), Error> {
        let mut failures = Vec::new();
        for layer in &self.layers {
            match layer.delete_all_emails() {
                Err(e) if e.is_unimplemented_in_layer() => continue,
                Err(e) => failures.push(e.to_string()),
                Ok(()) => (),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Multiple(failures.join("; ")))
        }
    }

    fn delete_email_by_id(&self, email_id: &str) -> Result<(), Error> {
        for layer in &self.layers {
            match layer.delete_email_by_id(email_id) {
                Err(e) if e.is_unimplemented_in_layer() => continue,
                Err(e) => return Err(e),
                Ok(()) => (),
            }
        }
        Ok(())
    }

    fn get_body_version(
        &self,
        email_id: &str,
        version: BodyVersion,
    ) -> Result<String, Error> {
        self.first_implementing("get_body_version", |l| {
            l.get_body_version(email_id, version)
        })
    }

    fn get_attachments(
        &self,
        email_id: &str,
    ) -> Result<Vec<AttachmentHeader>, Error> {
        self.first_implementing("get_attachments", |l| {
            l.get_attachments(email_id)
        })
    }

    fn get_attachment(
        &self,
        email_id: &str,
        attachment_id: &str,
    ) -> Result<Attachment, Error> {
        self.first_implementing("get_attachment", |l| {
            l.get_attachment(email_id, attachment_id)
        })
    }

    fn search_emails(
        &self,
        query: &str,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<EmailHeader>, usize), Error> {
        self.first_implementing("search_emails", |l| {
            l.search_emails(query, page, page_size)
        })
    }
}
