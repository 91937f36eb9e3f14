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

//! High-level queries over a parsed message.

use std::str::FromStr;

use chrono::prelude::*;

use super::encoded_word::decode_header;
use super::header::{self, Address, HeaderMap};
use super::part::Part;
use crate::support::error::Error;

/// The body renditions a message can be asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BodyVersion {
    Raw,
    PlainText,
    Html,
    WatchHtml,
}

impl BodyVersion {
    pub fn tag(self) -> &'static str {
        match self {
            BodyVersion::Raw => "raw",
            BodyVersion::PlainText => "plain-text",
            BodyVersion::Html => "html",
            BodyVersion::WatchHtml => "watch-html",
        }
    }

    /// The media type a non-raw version selects.
    fn target_type(self) -> Option<&'static str> {
        match self {
            BodyVersion::Raw => None,
            BodyVersion::PlainText => Some("text/plain"),
            BodyVersion::Html => Some("text/html"),
            BodyVersion::WatchHtml => Some("text/watch-html"),
        }
    }
}

impl FromStr for BodyVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "raw" => Ok(BodyVersion::Raw),
            "plain-text" => Ok(BodyVersion::PlainText),
            "html" => Ok(BodyVersion::Html),
            "watch-html" => Ok(BodyVersion::WatchHtml),
            _ => Err(Error::BadBodyVersion(s.to_owned())),
        }
    }
}

const PREVIEW_MAX_CHARS: usize = 100;

/// A message façade over the part tree.
///
/// Every accessor is pure; parse leniency (addresses, dates, encoded words)
/// yields lenient defaults because email in the wild is hostile.
#[derive(Clone, Debug)]
pub struct Message {
    root: Part,
}

impl Message {
    /// Parse a raw RFC 5322 message.
    pub fn parse(raw: &[u8]) -> Result<Message, Error> {
        let (headers, body_start) = header::parse_header_block(raw);
        let root = Part::parse(headers, &raw[body_start..])?;
        Ok(Message { root })
    }

    pub fn headers(&self) -> &HeaderMap {
        self.root.headers()
    }

    fn decoded_header(&self, name: &str) -> String {
        decode_header(self.headers().get(name).unwrap_or(""))
    }

    pub fn subject(&self) -> String {
        self.decoded_header("Subject")
    }

    pub fn sender(&self) -> Address {
        header::parse_address(&self.decoded_header("From"))
    }

    pub fn tos(&self) -> Vec<Address> {
        header::parse_address_list(&self.decoded_header("To"))
    }

    pub fn ccs(&self) -> Vec<Address> {
        header::parse_address_list(&self.decoded_header("Cc"))
    }

    /// Tos followed by CCs, in that order.
    pub fn recipients(&self) -> Vec<Address> {
        let mut recipients = self.tos();
        recipients.extend(self.ccs());
        recipients
    }

    /// The Date header; `None` when missing or unparseable.
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.headers().get("Date").and_then(header::parse_datetime)
    }

    pub fn has_attachments(&self) -> bool {
        let mut found = false;
        self.root.walk_leaves(&mut |leaf, _| {
            found = leaf.is_attachment();
            !found
        });
        found
    }

    /// Attachment leaves in depth-first pre-order; the position in the
    /// returned sequence is the attachment id.
    pub fn attachments(&self) -> Vec<&Part> {
        let mut attachments = Vec::new();
        self.root.walk_leaves(&mut |leaf, _| {
            if leaf.is_attachment() {
                attachments.push(leaf);
            }
            true
        });
        attachments
    }

    pub fn attachment(&self, id: usize) -> Option<&Part> {
        self.attachments().into_iter().nth(id)
    }

    /// The first leaf whose Content-ID matches `cid`, tolerating angle
    /// brackets on either side.
    pub fn part_by_cid(&self, cid: &str) -> Option<&Part> {
        let cid = cid.trim();
        let cid = cid.strip_prefix('<').unwrap_or(cid);
        let cid = cid.strip_suffix('>').unwrap_or(cid);

        let mut found = None;
        self.root.walk_leaves(&mut |leaf, _| {
            if leaf.content_id() == Some(cid) {
                found = Some(leaf);
                false
            } else {
                true
            }
        });
        found
    }

    /// The non-raw versions available on non-attachment leaves.
    pub fn body_versions(&self) -> Vec<BodyVersion> {
        let mut plain = false;
        let mut html = false;
        let mut watch = false;

        self.root.walk_leaves(&mut |leaf, _| {
            if !leaf.is_attachment() {
                match leaf.content_type().full_type().as_str() {
                    "text/plain" => plain = true,
                    "text/html" => html = true,
                    "text/watch-html" => watch = true,
                    _ => (),
                }
            }
            true
        });

        let mut versions = Vec::new();
        if plain {
            versions.push(BodyVersion::PlainText);
        }
        if html {
            versions.push(BodyVersion::Html);
        }
        if watch {
            versions.push(BodyVersion::WatchHtml);
        }
        versions
    }

    /// The decoded body for `version`, or the empty string when the message
    /// has no matching part. Asking for `Raw` here yields the empty string;
    /// raw bytes live with the storage layer, not the part tree.
    pub fn body(&self, version: BodyVersion) -> String {
        match version.target_type() {
            None => String::new(),
            Some(target) => {
                select_body(&self.root, target).unwrap_or_default()
            },
        }
    }

    /// A short plain-text preview: the first plain-text body, falling back
    /// to the first HTML body, trimmed to 100 characters.
    pub fn preview(&self) -> String {
        let mut plain: Option<String> = None;
        let mut html: Option<String> = None;

        self.root.walk_leaves(&mut |leaf, parent_subtype| {
            if leaf.is_attachment() {
                return true;
            }
            let in_alternative = parent_subtype
                .map(|s| s.eq_ignore_ascii_case("alternative"))
                .unwrap_or(false);
            match leaf.content_type().full_type().as_str() {
                "text/plain" if plain.is_none() => {
                    plain = Some(leaf.decoded_body_string());
                },
                "text/html"
                    if html.is_none()
                        && (in_alternative || plain.is_none()) =>
                {
                    html = Some(leaf.decoded_body_string());
                },
                _ => (),
            }
            plain.is_none()
        });

        let text = plain.or(html).unwrap_or_default();
        trim_preview(&text)
    }
}

/// Body selection per version target.
///
/// Inside a `multipart/alternative` branch, the direct leaf children are
/// scanned once for the target type; when the block carries body leaves of
/// other types but not the target, the block is skipped without descending.
/// Elsewhere the first matching non-attachment leaf in depth-first order
/// wins.
fn select_body(part: &Part, target: &str) -> Option<String> {
    match part {
        Part::Leaf { .. } => {
            if !part.is_attachment()
                && part.content_type().full_type() == target
            {
                Some(part.decoded_body_string())
            } else {
                None
            }
        },
        Part::Multipart { subtype, parts, .. } => {
            if subtype.eq_ignore_ascii_case("alternative") {
                let mut has_body_leaf = false;
                for child in parts {
                    if matches!(child, Part::Leaf { .. })
                        && !child.is_attachment()
                    {
                        let full_type = child.content_type().full_type();
                        if full_type == target {
                            return Some(child.decoded_body_string());
                        }
                        if matches!(
                            full_type.as_str(),
                            "text/plain" | "text/html" | "text/watch-html"
                        ) {
                            has_body_leaf = true;
                        }
                    }
                }
                if has_body_leaf {
                    // The alternative offers other renditions; do not pull
                    // the target from deeper inside it.
                    return None;
                }
            }
            parts.iter().find_map(|child| select_body(child, target))
        },
    }
}

fn trim_preview(text: &str) -> String {
    let mut preview: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
    if text.chars().count() > PREVIEW_MAX_CHARS {
        preview.push_str("...");
    }
    preview = preview.replace('\r', "").replace('\n', " ");
    preview.trim().to_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    const SIMPLE: &[u8] = b"From: a@x\nTo: b@y\nSubject: Hi\n\nBody";

    const ALTERNATIVE_WITH_ATTACHMENT: &[u8] =
        b"From: sender@example.com\r\n\
          To: to@example.com\r\n\
          Subject: alt\r\n\
          Content-Type: multipart/mixed; boundary=outer\r\n\
          \r\n\
          --outer\r\n\
          Content-Type: multipart/alternative; boundary=inner\r\n\
          \r\n\
          --inner\r\n\
          Content-Type: text/plain\r\n\
          \r\n\
          p\r\n\
          --inner\r\n\
          Content-Type: text/html\r\n\
          \r\n\
          <p>h</p>\r\n\
          --inner--\r\n\
          --outer\r\n\
          Content-Type: text/plain\r\n\
          Content-Disposition: attachment; filename=\"a.txt\"\r\n\
          \r\n\
          hello\r\n\
          --outer--\r\n";

    #[test]
    fn simple_plain_ingress() {
        let msg = Message::parse(SIMPLE).unwrap();
        assert_eq!("Body", msg.body(BodyVersion::PlainText));
        assert_eq!("Hi", msg.subject());
        assert_eq!(
            vec![Address {
                name: String::new(),
                address: "b@y".to_owned(),
            }],
            msg.recipients()
        );
        assert!(!msg.has_attachments());
        assert_eq!(vec![BodyVersion::PlainText], msg.body_versions());
        assert_eq!("Body", msg.preview());
        assert_eq!("a@x", msg.sender().address);
        assert!(msg.date().is_none());
    }

    #[test]
    fn alternative_with_attachment() {
        let msg = Message::parse(ALTERNATIVE_WITH_ATTACHMENT).unwrap();
        assert_eq!("p", msg.body(BodyVersion::PlainText));
        assert!(msg.body(BodyVersion::Html).contains("<p>h</p>"));
        assert!(msg.has_attachments());

        let attachments = msg.attachments();
        assert_eq!(1, attachments.len());
        assert_eq!("a.txt", attachments[0].filename());
        assert_eq!(b"hello", &attachments[0].decoded_body()[..]);
        assert!(msg.attachment(0).is_some());
        assert!(msg.attachment(1).is_none());

        assert_eq!("p", msg.preview());
        assert_eq!(
            vec![BodyVersion::PlainText, BodyVersion::Html],
            msg.body_versions()
        );
    }

    #[test]
    fn alternative_without_target_is_skipped() {
        // watch-html lives outside the alternative block; asking for it
        // must not be blocked by the alternative.
        let msg = Message::parse(
            b"Content-Type: multipart/mixed; boundary=outer\r\n\
              \r\n\
              --outer\r\n\
              Content-Type: multipart/alternative; boundary=inner\r\n\
              \r\n\
              --inner\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              p\r\n\
              --inner--\r\n\
              --outer\r\n\
              Content-Type: text/watch-html\r\n\
              \r\n\
              <w>watch</w>\r\n\
              --outer--\r\n",
        )
        .unwrap();
        assert_eq!("<w>watch</w>", msg.body(BodyVersion::WatchHtml));
        assert_eq!("p", msg.body(BodyVersion::PlainText));
        // No html rendition anywhere
        assert_eq!("", msg.body(BodyVersion::Html));
    }

    #[test]
    fn attachments_are_not_bodies() {
        let msg = Message::parse(
            b"Content-Type: multipart/mixed; boundary=b\r\n\
              \r\n\
              --b\r\n\
              Content-Type: text/plain\r\n\
              Content-Disposition: attachment; filename=\"x.txt\"\r\n\
              \r\n\
              attached\r\n\
              --b\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              real body\r\n\
              --b--\r\n",
        )
        .unwrap();
        assert_eq!("real body", msg.body(BodyVersion::PlainText));
        assert_eq!("real body", msg.preview());
    }

    #[test]
    fn part_by_cid() {
        let msg = Message::parse(
            b"Content-Type: multipart/related; boundary=b\r\n\
              \r\n\
              --b\r\n\
              Content-Type: text/html\r\n\
              \r\n\
              <img src=\"cid:image1@x\">\r\n\
              --b\r\n\
              Content-Type: image/png\r\n\
              Content-ID: <image1@x>\r\n\
              Content-Transfer-Encoding: base64\r\n\
              \r\n\
              aGVsbG8=\r\n\
              --b--\r\n",
        )
        .unwrap();

        let part = msg.part_by_cid("image1@x").unwrap();
        assert_eq!(b"hello", &part.decoded_body()[..]);
        assert_eq!("image/png", part.content_type().full_type());
        // Angle-bracket tolerance in the query
        assert!(msg.part_by_cid("<image1@x>").is_some());
        assert!(msg.part_by_cid("nope@x").is_none());
    }

    #[test]
    fn subject_with_encoded_words() {
        let msg = Message::parse(
            b"Subject: =?ISO-8859-1?Q?Andr=E9?= says hi\n\nx",
        )
        .unwrap();
        assert_eq!("Andr\u{e9} says hi", msg.subject());
    }

    #[test]
    fn subject_with_undecodable_word_stays_verbatim() {
        // One bad encoded word leaves the whole header undecoded
        let msg = Message::parse(
            b"Subject: =?UTF-8?Q?Hi?= =?BOGUS?Q?x?=\n\nx",
        )
        .unwrap();
        assert_eq!("=?UTF-8?Q?Hi?= =?BOGUS?Q?x?=", msg.subject());
    }

    #[test]
    fn recipients_are_tos_then_ccs() {
        let msg = Message::parse(
            b"To: a@x, b@y\nCc: c@z\n\nx",
        )
        .unwrap();
        let recipients: Vec<String> = msg
            .recipients()
            .into_iter()
            .map(|a| a.address)
            .collect();
        assert_eq!(vec!["a@x", "b@y", "c@z"], recipients);
    }

    #[test]
    fn date_parsing_and_fallback() {
        let msg = Message::parse(
            b"Date: Tue, 1 Jul 2003 10:52:37 +0200\n\nx",
        )
        .unwrap();
        assert_eq!(2003, msg.date().unwrap().year());

        let bad = Message::parse(b"Date: not-a-date\n\nx").unwrap();
        assert!(bad.date().is_none());
    }

    #[test]
    fn preview_trimming() {
        let long_body = format!(
            "From: a@x\n\n{}",
            "x".repeat(PREVIEW_MAX_CHARS + 50)
        );
        let msg = Message::parse(long_body.as_bytes()).unwrap();
        let preview = msg.preview();
        assert!(preview.ends_with("..."));
        assert_eq!(PREVIEW_MAX_CHARS + 3, preview.chars().count());

        let crlf = Message::parse(b"From: a@x\n\n  line1\r\nline2  ")
            .unwrap();
        assert_eq!("line1 line2", crlf.preview());
    }

    #[test]
    fn preview_prefers_plain_over_html() {
        let msg = Message::parse(
            b"Content-Type: multipart/alternative; boundary=b\r\n\
              \r\n\
              --b\r\n\
              Content-Type: text/html\r\n\
              \r\n\
              <p>html</p>\r\n\
              --b\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              plain\r\n\
              --b--\r\n",
        )
        .unwrap();
        assert_eq!("plain", msg.preview());
    }

    #[test]
    fn body_version_tags_round_trip() {
        for tag in &["raw", "plain-text", "html", "watch-html"] {
            assert_eq!(*tag, tag.parse::<BodyVersion>().unwrap().tag());
        }
        assert!(matches!(
            "banana".parse::<BodyVersion>(),
            Err(Error::BadBodyVersion(_))
        ));
    }

    #[test]
    fn body_version_soundness() {
        // Property: body_versions() lists a tag iff body(tag) is non-empty
        for raw in &[
            SIMPLE.to_vec(),
            ALTERNATIVE_WITH_ATTACHMENT.to_vec(),
            b"Content-Type: text/html\n\n<p>only html</p>".to_vec(),
        ] {
            let msg = Message::parse(raw).unwrap();
            for version in [
                BodyVersion::PlainText,
                BodyVersion::Html,
                BodyVersion::WatchHtml,
            ] {
                let listed = msg.body_versions().contains(&version);
                assert_eq!(
                    listed,
                    !msg.body(version).is_empty(),
                    "version {:?}",
                    version
                );
            }
        }
    }
}
