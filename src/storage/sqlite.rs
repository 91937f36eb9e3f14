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

//! The SQLite layer.
//!
//! Raw message blobs keyed by id in a single table. Queries parse the blob
//! on demand exactly like the filesystem layer parses its files; SQLite
//! only provides durable keyed storage here, not an index.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{
    Attachment, AttachmentHeader, BodyVersion, EmailHeader, Mailbox,
    Storage, StorageLayer, StoredMessage,
};
use crate::mime::message::Message;
use crate::support::error::Error;

pub struct SqliteLayer {
    conn: Mutex<Connection>,
}

impl SqliteLayer {
    pub fn new(database: &Path) -> Result<Self, Error> {
        log::info!(
            "using sqlite storage with database {}",
            database.display()
        );
        let conn = Connection::open(database)?;
        Ok(SqliteLayer {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    fn in_memory() -> Self {
        SqliteLayer {
            conn: Mutex::new(Connection::open_in_memory().unwrap()),
        }
    }

    fn read_raw(&self, email_id: &str) -> Result<Vec<u8>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT message FROM emails WHERE id = ?1",
            params![email_id],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()?
        .ok_or_else(|| Error::NxEmail(email_id.to_owned()))
    }

    fn parse_email(&self, email_id: &str) -> Result<Message, Error> {
        let raw = self.read_raw(email_id)?;
        Message::parse(&raw)
    }

    fn parse_all(&self) -> Result<Vec<(String, Message)>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, message FROM emails ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (email_id, raw) = row?;
            messages.push((email_id, Message::parse(&raw)?));
        }
        Ok(messages)
    }
}

impl Storage for SqliteLayer {
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
        self.conn.lock().unwrap().execute("DELETE FROM emails", [])?;
        Ok(())
    }

    fn delete_email_by_id(&self, email_id: &str) -> Result<(), Error> {
        let deleted = self.conn.lock().unwrap().execute(
            "DELETE FROM emails WHERE id = ?1",
            params![email_id],
        )?;
        if deleted == 0 {
            return Err(Error::NxEmail(email_id.to_owned()));
        }
        Ok(())
    }

    fn get_body_version(
        &self,
        email_id: &str,
        version: BodyVersion,
    ) -> Result<String, Error> {
        if version == BodyVersion::Raw {
            let raw = self.read_raw(email_id)?;
            return Ok(String::from_utf8_lossy(&raw).into_owned());
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

impl StorageLayer for SqliteLayer {
    fn load(&self, _root: Option<&dyn StorageLayer>) -> Result<(), Error> {
        self.conn.lock().unwrap().execute(
            "CREATE TABLE IF NOT EXISTS emails (
                 id TEXT PRIMARY KEY,
                 message BLOB NOT NULL
             )",
            [],
        )?;
        Ok(())
    }

    fn set_with_id(
        &self,
        email_id: &str,
        message: &StoredMessage,
    ) -> Result<(), Error> {
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO emails (id, message) VALUES (?1, ?2)",
            params![email_id, message.to_bytes()],
        )?;
        Ok(())
    }
}
