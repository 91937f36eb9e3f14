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

//! The MIME part tree.
//!
//! A message parses into a tree of multipart branches and leaf parts. The
//! tree is immutable after construction; body decoding happens lazily when
//! a leaf body is asked for.

use std::borrow::Cow;

use super::header::{
    self, ContentTransferEncoding, ContentType, HeaderMap,
};
use crate::support::error::Error;

#[derive(Clone, Debug)]
pub enum Part {
    /// A `multipart/*` branch: its own headers, the multipart subtype, and
    /// the child parts in wire order.
    Multipart {
        headers: HeaderMap,
        subtype: String,
        parts: Vec<Part>,
    },
    /// A terminal part: its own headers and the raw (undecoded) body.
    Leaf { headers: HeaderMap, body: Vec<u8> },
}

impl Part {
    /// Recursively parse a part from its header map and raw body.
    ///
    /// Malformed MIME (an unparseable Content-Type, a multipart without a
    /// boundary, a multipart body without its final delimiter) propagates
    /// as `Error::MimeParse`.
    pub fn parse(headers: HeaderMap, body: &[u8]) -> Result<Part, Error> {
        let content_type = resolve_content_type(&headers)?;

        if !content_type.is_type("multipart") {
            return Ok(Part::Leaf {
                headers,
                body: body.to_vec(),
            });
        }

        let boundary = content_type.parm("boundary").ok_or_else(|| {
            Error::MimeParse("multipart without boundary parameter".to_owned())
        })?;

        let mut parts = Vec::new();
        for raw_part in split_multipart(body, boundary)? {
            let (part_headers, body_start) =
                header::parse_header_block(raw_part);
            parts.push(Part::parse(part_headers, &raw_part[body_start..])?);
        }

        Ok(Part::Multipart {
            headers,
            subtype: content_type.subtype,
            parts,
        })
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            Part::Multipart { headers, .. } => headers,
            Part::Leaf { headers, .. } => headers,
        }
    }

    /// The parsed Content-Type of this part, defaulting to `text/plain`.
    pub fn content_type(&self) -> ContentType {
        resolve_content_type(self.headers())
            .unwrap_or_else(|_| ContentType::text_plain())
    }

    /// Whether this is a leaf whose Content-Disposition marks it as an
    /// attachment.
    pub fn is_attachment(&self) -> bool {
        match self {
            Part::Multipart { .. } => false,
            Part::Leaf { headers, .. } => headers
                .get("Content-Disposition")
                .map(|d| d.trim_start().starts_with("attachment"))
                .unwrap_or(false),
        }
    }

    /// The raw, undecoded body of a leaf.
    pub fn raw_body(&self) -> &[u8] {
        match self {
            Part::Multipart { .. } => &[],
            Part::Leaf { body, .. } => body,
        }
    }

    /// The body of a leaf after Content-Transfer-Encoding decoding.
    ///
    /// Decoding is tolerant: if base64 decoding fails the raw body is
    /// returned, and quoted-printable decoding passes invalid sequences
    /// through. Unknown and identity encodings return the raw body.
    pub fn decoded_body(&self) -> Cow<[u8]> {
        let (headers, body) = match self {
            Part::Multipart { .. } => return Cow::Borrowed(&[] as &[u8]),
            Part::Leaf { headers, body } => (headers, body),
        };

        let cte = headers
            .get("Content-Transfer-Encoding")
            .and_then(header::parse_content_transfer_encoding)
            .unwrap_or_default();

        match cte {
            ContentTransferEncoding::Base64 => {
                // Line breaks are not part of the encoding
                let stripped: Vec<u8> = body
                    .iter()
                    .copied()
                    .filter(|&b| b != b'\r' && b != b'\n')
                    .collect();
                match base64::decode(&stripped) {
                    Ok(decoded) => Cow::Owned(decoded),
                    Err(_) => Cow::Borrowed(body.as_slice()),
                }
            },
            ContentTransferEncoding::QuotedPrintable => {
                super::quoted_printable::qp_decode(body)
            },
            _ => Cow::Borrowed(body.as_slice()),
        }
    }

    /// The decoded body as text, with invalid UTF-8 replaced.
    pub fn decoded_body_string(&self) -> String {
        match self.decoded_body() {
            Cow::Borrowed(b) => String::from_utf8_lossy(b).into_owned(),
            Cow::Owned(v) => match String::from_utf8(v) {
                Ok(s) => s,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            },
        }
    }

    /// The Content-ID of a leaf with angle brackets removed, if present.
    pub fn content_id(&self) -> Option<&str> {
        let cid = self.headers().get("Content-ID")?;
        let cid = cid.trim();
        let cid = cid.strip_prefix('<').unwrap_or(cid);
        let cid = cid.strip_suffix('>').unwrap_or(cid);
        Some(cid)
    }

    /// The filename parameter of an attachment's Content-Disposition.
    pub fn filename(&self) -> String {
        self.headers()
            .get("Content-Disposition")
            .and_then(|d| {
                d.split(';').skip(1).find_map(|parm| {
                    let parm = parm.trim();
                    parm.strip_prefix("filename=")
                        .map(|v| v.trim().trim_matches('"').to_owned())
                })
            })
            .unwrap_or_default()
    }

    /// Depth-first pre-order walk over all leaves, with the enclosing
    /// branch's multipart subtype as context (`None` at the root).
    ///
    /// The callback returns `false` to stop the walk.
    pub fn walk_leaves<'a>(
        &'a self,
        f: &mut impl FnMut(&'a Part, Option<&'a str>) -> bool,
    ) -> bool {
        self.walk_leaves_inner(None, f)
    }

    fn walk_leaves_inner<'a>(
        &'a self,
        parent_subtype: Option<&'a str>,
        f: &mut impl FnMut(&'a Part, Option<&'a str>) -> bool,
    ) -> bool {
        match self {
            Part::Leaf { .. } => f(self, parent_subtype),
            Part::Multipart { subtype, parts, .. } => {
                for part in parts {
                    if !part.walk_leaves_inner(Some(subtype), f) {
                        return false;
                    }
                }
                true
            },
        }
    }
}

fn resolve_content_type(headers: &HeaderMap) -> Result<ContentType, Error> {
    match headers.get("Content-Type") {
        None => Ok(ContentType::text_plain()),
        Some(value) => header::parse_content_type(value).ok_or_else(|| {
            Error::MimeParse(format!("bad Content-Type: {:?}", value))
        }),
    }
}

/// Split a multipart body into its raw parts.
///
/// A delimiter is a line starting with `--boundary`; the line ending
/// immediately preceding a delimiter belongs to the delimiter, not to the
/// part before it. Text before the first delimiter (the preamble) and after
/// the `--boundary--` close (the epilogue) is discarded. A body that ends
/// without the close delimiter is malformed.
fn split_multipart<'a>(
    body: &'a [u8],
    boundary: &str,
) -> Result<Vec<&'a [u8]>, Error> {
    let mut delim = Vec::with_capacity(boundary.len() + 2);
    delim.extend_from_slice(b"--");
    delim.extend_from_slice(boundary.as_bytes());

    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut prev_ending_len = 0;
    let mut ix = 0;
    let mut closed = false;

    while ix < body.len() {
        let line_end = memchr::memchr(b'\n', &body[ix..])
            .map(|n| ix + n + 1)
            .unwrap_or(body.len());
        let line = &body[ix..line_end];

        if line.starts_with(&delim) {
            let is_final = line[delim.len()..].starts_with(b"--");

            if let Some(start) = part_start.take() {
                // The line ending before this delimiter is only part
                // content if the part actually had a line of its own.
                let end = std::cmp::max(start, ix - prev_ending_len);
                parts.push(&body[start..end]);
            }
            if is_final {
                closed = true;
                break;
            }
            part_start = Some(line_end);
        }

        prev_ending_len = if line.ends_with(b"\r\n") {
            2
        } else if line.ends_with(b"\n") {
            1
        } else {
            0
        };
        ix = line_end;
    }

    if !closed {
        return Err(Error::MimeParse(
            "multipart body without final delimiter".to_owned(),
        ));
    }

    Ok(parts)
}
