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

use std::borrow::Cow;
use std::str;

/// Decodes quoted-printable encoding, as described by RFC 2045.
///
/// Encoded bytes and soft line endings are both handled, the latter by
/// discarding. UNIX line endings are handled as well as DOS line endings.
///
/// This never fails. Invalid or truncated escape sequences are passed
/// through untransformed. Restrictions such as not having trailing
/// whitespace on a line are not enforced. 8-bit characters are passed
/// through, including invalid UTF-8.
pub fn qp_decode(s: &[u8]) -> Cow<[u8]> {
    if memchr::memchr(b'=', s).is_none() {
        return Cow::Borrowed(s);
    }

    let mut transformed = Vec::with_capacity(s.len());
    let mut ix = 0;

    while ix < s.len() {
        let byte = s[ix];
        if b'=' != byte {
            transformed.push(byte);
            ix += 1;
            continue;
        }

        // Soft line break, UNIX ending
        if s[ix + 1..].starts_with(b"\n") {
            ix += 2;
            continue;
        }
        // Soft line break, DOS ending
        if s[ix + 1..].starts_with(b"\r\n") {
            ix += 3;
            continue;
        }

        match s
            .get(ix + 1..ix + 3)
            .and_then(|encoded| str::from_utf8(encoded).ok())
            .and_then(|encoded| u8::from_str_radix(encoded, 16).ok())
        {
            Some(decoded) => {
                transformed.push(decoded);
                ix += 3;
            },
            // Invalid or truncated escape, pass the '=' through verbatim
            None => {
                transformed.push(b'=');
                ix += 1;
            },
        }
    }

    Cow::Owned(transformed)
}
