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

//! The on-disk `.eml` layer.
//!
//! One file per message named `<id><suffix>`. In mailhog-compatible mode
//! the suffix is `@mailhog.example` and writes prepend a fixed envelope
//! stub which read paths strip again. There is no sidecar metadata and no
//! index; every query reparses the file.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use super::{
    Attachment, AttachmentHeader, BodyVersion, EmailHeader, Mailbox,
    Storage, StorageLayer, StoredMessage,
};
use crate::mime::message::Message;
use crate::support::error::Error;
use crate::support::system_config::FilesystemFormat;

const EML_SUFFIX: &str = ".eml";
const MAILHOG_SUFFIX: &str = "@mailhog.example";

// Envelope stub written before the message in mailhog-compatible files.
const MAILHOG_STUB: &[u8] = b"HELO:<mailhog.example>\n\
      FROM:<nobody@mailhog.example>\n\
      TO:<nobody@mailhog.example>\n\
      \n";

pub struct FilesystemLayer {
    folder: PathBuf,
    format: FilesystemFormat,
}

impl FilesystemLayer {
    pub fn new(folder: PathBuf, format: FilesystemFormat) -> Self {
        log::info!("using storage in folder {}", folder.display());
        FilesystemLayer { folder, format }
    }

    fn suffix(&self) -> &'static str {
        match self.format {
            FilesystemFormat::Eml => EML_SUFFIX,
            FilesystemFormat::Mailhog => MAILHOG_SUFFIX,
        }
    }

    fn path_of(&self, email_id: &str) -> PathBuf {
        self.folder.join(format!("{}{}", email_id, self.suffix()))
    }

    fn list_email_ids(&self) -> Result<Vec<String>, Error> {
        let mut email_ids = Vec::new();
        for entry in fs::read_dir(&self.folder)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(name) => name,
                None => continue,
            };
            if let Some(email_id) = name.strip_suffix(self.suffix()) {
                email_ids.push(email_id.to_owned());
            }
        }
        email_ids.sort();
        Ok(email_ids)
    }

    /// The stored bytes of a message, with the mailhog stub stripped.
    fn read_raw(&self, email_id: &str) -> Result<Vec<u8>, Error> {
        let path = self.path_of(email_id);
        let data = fs::read(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::NxEmail(email_id.to_owned())
            } else {
                Error::Io(e)
            }
        })?;

        match self.format {
            FilesystemFormat::Eml => Ok(data),
            FilesystemFormat::Mailhog => {
                if data.starts_with(MAILHOG_STUB) {
                    Ok(data[MAILHOG_STUB.len()..].to_vec())
                } else {
                    Ok(data)
                }
            },
        }
    }

    fn load_message(&self, email_id: &str) -> Result<Message, Error> {
        let raw = self.read_raw(email_id)?;
        Message::parse(&raw).map_err(|e| {
            Error::MimeParse(format!("email {}: {}", email_id, e))
        })
    }

    fn load_all_messages(&self) -> Result<Vec<(String, Message)>, Error> {
        let mut messages = Vec::new();
        for email_id in self.list_email_ids()? {
            let message = self.load_message(&email_id)?;
            messages.push((email_id, message));
        }
        Ok(messages)
    }
}

impl Storage for FilesystemLayer {
    fn get_mailboxes(&self) -> Result<Vec<Mailbox>, Error> {
        let messages = self.load_all_messages()?;
        Ok(super::mailboxes_from_messages(
            messages.iter().map(|(_, m)| m),
        ))
    }

    fn get_email_by_id(&self, email_id: &str) -> Result<EmailHeader, Error> {
        let message = self.load_message(email_id)?;
        Ok(super::email_header_from_message(email_id, &message))
    }

    fn delete_all_emails(&self) -> Result<(), Error> {
        for email_id in self.list_email_ids()? {
            let path = self.path_of(&email_id);
            log::debug!("deleting file {}", path.display());
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn delete_email_by_id(&self, email_id: &str) -> Result<(), Error> {
        let path = self.path_of(email_id);
        log::debug!("deleting file {}", path.display());
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::NxEmail(email_id.to_owned())
            } else {
                Error::Io(e)
            }
        })
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
        let message = self.load_message(email_id)?;
        Ok(message.body(version))
    }

    fn get_attachments(
        &self,
        email_id: &str,
    ) -> Result<Vec<AttachmentHeader>, Error> {
        let message = self.load_message(email_id)?;
        Ok(super::attachment_headers_from_message(&message))
    }

    fn get_attachment(
        &self,
        email_id: &str,
        attachment_id: &str,
    ) -> Result<Attachment, Error> {
        let message = self.load_message(email_id)?;
        log::debug!("searching for attachment {}", attachment_id);
        super::attachment_from_message(&message, attachment_id)
    }

    fn search_emails(
        &self,
        query: &str,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<EmailHeader>, usize), Error> {
        let messages = self.load_all_messages()?;
        super::search_messages(messages, query, page, page_size)
    }
}

impl StorageLayer for FilesystemLayer {
    fn load(&self, _root: Option<&dyn StorageLayer>) -> Result<(), Error> {
        if !self.folder.is_dir() {
            log::info!("creating folder {}", self.folder.display());
            fs::create_dir_all(&self.folder)?;
        }
        Ok(())
    }

    fn set_with_id(
        &self,
        email_id: &str,
        message: &StoredMessage,
    ) -> Result<(), Error> {
        log::info!("saving email {}", email_id);
        let path = self.path_of(email_id);

        let mut file = fs::File::create(&path)?;
        if self.format == FilesystemFormat::Mailhog {
            file.write_all(MAILHOG_STUB)?;
        }
        file.write_all(&message.to_bytes())?;
        file.flush()?;
        drop(file);

        // Reject anything we would not be able to parse back
        if let Err(e) = self.load_message(email_id) {
            let _ = fs::remove_file(&path);
            return Err(Error::MimeParse(format!(
                "cannot parse email {}: {}",
                email_id, e
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    const SIMPLE_EMAIL: &[u8] = b"From: from@example.com\n\
          To: to1@example.com\n\
          Subject: Test email\n\
          \n\
          This is the body of the email.";

    fn layer(tmp: &TempDir, format: FilesystemFormat) -> FilesystemLayer {
        let layer =
            FilesystemLayer::new(tmp.path().join("mail"), format);
        layer.load(None).unwrap();
        layer
    }

    #[test]
    fn load_creates_folder() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("sub").join("mail");
        let layer =
            FilesystemLayer::new(folder.clone(), FilesystemFormat::Eml);
        layer.load(None).unwrap();
        assert!(folder.is_dir());
    }

    #[test]
    fn eml_round_trip() {
        let tmp = TempDir::new().unwrap();
        let layer = layer(&tmp, FilesystemFormat::Eml);

        let message = StoredMessage::parse(SIMPLE_EMAIL);
        layer.set_with_id("simple-email", &message).unwrap();

        assert!(tmp.path().join("mail").join("simple-email.eml").is_file());
        assert_eq!(vec!["simple-email"], layer.list_email_ids().unwrap());

        let raw = layer
            .get_body_version("simple-email", BodyVersion::Raw)
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(SIMPLE_EMAIL),
            raw
        );
    }

    #[test]
    fn mailhog_round_trip() {
        let tmp = TempDir::new().unwrap();
        let layer = layer(&tmp, FilesystemFormat::Mailhog);

        let message = StoredMessage::parse(SIMPLE_EMAIL);
        layer.set_with_id("simple-email", &message).unwrap();

        let path = tmp
            .path()
            .join("mail")
            .join("simple-email@mailhog.example");
        assert!(path.is_file());

        // The stored file carries the envelope stub...
        let on_disk = fs::read(&path).unwrap();
        assert!(on_disk.starts_with(MAILHOG_STUB));

        // ...which read paths strip again
        assert_eq!(vec!["simple-email"], layer.list_email_ids().unwrap());
        let raw = layer
            .get_body_version("simple-email", BodyVersion::Raw)
            .unwrap();
        assert_eq!(String::from_utf8_lossy(SIMPLE_EMAIL), raw);

        let header = layer.get_email_by_id("simple-email").unwrap();
        assert_eq!("Test email", header.subject);
    }

    #[test]
    fn unparseable_write_is_rolled_back() {
        let tmp = TempDir::new().unwrap();
        let layer = layer(&tmp, FilesystemFormat::Eml);

        // multipart without a final delimiter cannot parse back
        let message = StoredMessage::parse(
            b"Content-Type: multipart/mixed; boundary=b\n\
              \n\
              --b\n\
              \n\
              never closed",
        );
        assert!(matches!(
            layer.set_with_id("broken", &message),
            Err(Error::MimeParse(_))
        ));
        assert!(!tmp.path().join("mail").join("broken.eml").exists());
        assert!(layer.list_email_ids().unwrap().is_empty());
    }

    #[test]
    fn get_email_by_id_missing_is_nx() {
        let tmp = TempDir::new().unwrap();
        let layer = layer(&tmp, FilesystemFormat::Eml);
        assert!(matches!(
            layer.get_email_by_id("absent"),
            Err(Error::NxEmail(_))
        ));
        assert!(matches!(
            layer.delete_email_by_id("absent"),
            Err(Error::NxEmail(_))
        ));
    }

    #[test]
    fn mailboxes_are_sorted_unique_recipients() {
        let tmp = TempDir::new().unwrap();
        let layer = layer(&tmp, FilesystemFormat::Eml);

        layer
            .set_with_id(
                "a",
                &StoredMessage::parse(
                    b"To: zoe@example.com\nCc: al@example.com\n\nx",
                ),
            )
            .unwrap();
        layer
            .set_with_id(
                "b",
                &StoredMessage::parse(b"To: zoe@example.com\n\nx"),
            )
            .unwrap();

        let mailboxes = layer.get_mailboxes().unwrap();
        let names: Vec<&str> =
            mailboxes.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(vec!["al@example.com", "zoe@example.com"], names);
    }

    #[test]
    fn search_filters_sorts_and_paginates() {
        let tmp = TempDir::new().unwrap();
        let layer = layer(&tmp, FilesystemFormat::Eml);

        for (id, date, subject) in [
            ("m1", "Wed, 01 Jan 2020 00:00:00 +0000", "alpha"),
            ("m2", "Fri, 01 Jan 2021 00:00:00 +0000", "beta"),
            ("m3", "Sat, 01 Jan 2022 00:00:00 +0000", "alpha beta"),
        ] {
            let raw = format!(
                "From: from@example.com\nTo: to@example.com\n\
                 Subject: {}\nDate: {}\n\nbody",
                subject, date
            );
            layer
                .set_with_id(id, &StoredMessage::parse(raw.as_bytes()))
                .unwrap();
        }

        let (all, total) = layer.search_emails("", 1, -1).unwrap();
        assert_eq!(3, total);
        let ids: Vec<&str> = all.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(vec!["m3", "m2", "m1"], ids);

        let (alphas, total) =
            layer.search_emails("subject:alpha", 1, 20).unwrap();
        assert_eq!(2, total);
        assert_eq!("m3", alphas[0].id);

        let (page2, total) = layer.search_emails("", 2, 2).unwrap();
        assert_eq!(3, total);
        assert_eq!(1, page2.len());
        assert_eq!("m1", page2[0].id);

        assert!(matches!(
            layer.search_emails("", 0, 2),
            Err(Error::BadPageNumber(_))
        ));
        assert!(matches!(
            layer.search_emails("has:banana", 1, 20),
            Err(Error::InvalidQuery { .. })
        ));
    }

    #[test]
    fn delete_all_removes_every_message() {
        let tmp = TempDir::new().unwrap();
        let layer = layer(&tmp, FilesystemFormat::Eml);

        for id in ["a", "b", "c"] {
            layer
                .set_with_id(id, &StoredMessage::parse(SIMPLE_EMAIL))
                .unwrap();
        }
        assert_eq!(3, layer.list_email_ids().unwrap().len());

        layer.delete_all_emails().unwrap();
        assert!(layer.list_email_ids().unwrap().is_empty());
    }

    #[test]
    fn attachments_by_ordinal() {
        let tmp = TempDir::new().unwrap();
        let layer = layer(&tmp, FilesystemFormat::Eml);

        layer
            .set_with_id(
                "m",
                &StoredMessage::parse(
                    b"Content-Type: multipart/mixed; boundary=b\n\
                      \n\
                      --b\n\
                      Content-Type: text/plain\n\
                      \n\
                      body\n\
                      --b\n\
                      Content-Type: text/plain\n\
                      Content-Disposition: attachment; filename=\"a.txt\"\n\
                      \n\
                      first\n\
                      --b\n\
                      Content-Type: application/pdf\n\
                      Content-Disposition: attachment; filename=\"b.pdf\"\n\
                      \n\
                      second\n\
                      --b--\n",
                ),
            )
            .unwrap();

        let headers = layer.get_attachments("m").unwrap();
        assert_eq!(2, headers.len());
        assert_eq!("0", headers[0].id);
        assert_eq!("a.txt", headers[0].filename);
        assert_eq!("1", headers[1].id);
        assert_eq!("b.pdf", headers[1].filename);

        // Stable across invocations
        let again = layer.get_attachments("m").unwrap();
        assert_eq!(headers.len(), again.len());
        for (a, b) in headers.iter().zip(again.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.filename, b.filename);
        }

        let attachment = layer.get_attachment("m", "1").unwrap();
        assert_eq!(b"second", &attachment.data[..]);
        assert_eq!("application/pdf", attachment.header.content_type);

        assert!(matches!(
            layer.get_attachment("m", "2"),
            Err(Error::NxAttachment(_))
        ));
        assert!(matches!(
            layer.get_attachment("m", "x"),
            Err(Error::NxAttachment(_))
        ));
    }
}
