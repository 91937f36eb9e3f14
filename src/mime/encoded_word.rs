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

//! RFC 2047 encoded-word decoding for unstructured headers.

use std::str;

/// Decode every encoded word in an unstructured header value.
///
/// Whitespace between adjacent encoded words is deleted; all other text
/// passes through verbatim. Decoding is all-or-nothing: if any encoded word
/// is malformed or names an unsupported charset, the whole input is
/// returned unchanged.
///
/// Supported charsets: UTF-8, US-ASCII, ISO-8859-1.
pub fn decode_header(text: &str) -> String {
    match try_decode_header(text) {
        Some(decoded) => decoded,
        None => text.to_owned(),
    }
}

fn try_decode_header(text: &str) -> Option<String> {
    let mut decoded = String::with_capacity(text.len());
    let mut last_was_encoded = false;
    let mut rest = text;

    while !rest.is_empty() {
        let word_start = rest
            .find(|c: char| !c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let (space, after) = rest.split_at(word_start);
        let word_end = after
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(after.len());
        let (word, tail) = after.split_at(word_end);
        rest = tail;

        if word.is_empty() {
            // Only trailing whitespace remains
            decoded.push_str(space);
            break;
        }

        match parse_encoded_word(word) {
            Some((charset, encoding, payload)) => {
                // The word is unambiguously an encoded word; a failure
                // here poisons the entire header.
                let content = decode_word(charset, encoding, payload)?;
                if !last_was_encoded {
                    decoded.push_str(space);
                }
                decoded.push_str(&content);
                last_was_encoded = true;
            },
            None => {
                decoded.push_str(space);
                decoded.push_str(word);
                last_was_encoded = false;
            },
        }
    }

    Some(decoded)
}

/// Split `=?charset?encoding?payload?=` into its fields. Anything that does
/// not have exactly this shape is ordinary text, not an encoded word.
fn parse_encoded_word(word: &str) -> Option<(&str, &str, &str)> {
    let inner = word.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut fields = inner.split('?');
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(charset), Some(encoding), Some(payload), None) => {
            Some((charset, encoding, payload))
        },
        _ => None,
    }
}

fn decode_word(
    charset: &str,
    encoding: &str,
    payload: &str,
) -> Option<String> {
    let bytes = match encoding {
        "q" | "Q" => q_decode(payload)?,
        "b" | "B" => base64::decode(payload).ok()?,
        _ => return None,
    };

    // RFC 2184 allows a language suffix on the charset field; there is
    // nothing useful to do with it.
    let charset = charset.split('*').next().unwrap();

    if charset.eq_ignore_ascii_case("utf-8")
        || charset.eq_ignore_ascii_case("us-ascii")
    {
        String::from_utf8(bytes).ok()
    } else if charset.eq_ignore_ascii_case("iso-8859-1") {
        // Latin-1 maps byte-for-byte onto the first 256 code points
        Some(bytes.iter().map(|&b| b as char).collect())
    } else {
        None
    }
}

/// The Q encoding of RFC 2047: `_` stands for space, `=XX` for a byte.
/// Unlike body quoted-printable this is strict; a dangling or non-hex
/// escape fails the word.
fn q_decode(payload: &str) -> Option<Vec<u8>> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut ix = 0;

    while ix < bytes.len() {
        match bytes[ix] {
            b'_' => {
                out.push(b' ');
                ix += 1;
            },
            b'=' => {
                let encoded = bytes.get(ix + 1..ix + 3)?;
                let encoded = str::from_utf8(encoded).ok()?;
                out.push(u8::from_str_radix(encoded, 16).ok()?);
                ix += 3;
            },
            byte => {
                out.push(byte);
                ix += 1;
            },
        }
    }

    Some(out)
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_decode_header() {
        // Plain text and empty input pass through
        assert_eq!("", decode_header(""));
        assert_eq!(
            "This is a simple string",
            decode_header("This is a simple string")
        );

        assert_eq!(
            "This is a test <test@example.com>",
            decode_header("=?UTF-8?Q?This_is_a_test?= <test@example.com>")
        );
        assert_eq!(
            "\u{261d} Point here  <test@example.com>",
            decode_header(
                "=?UTF-8?Q?=E2=98=9D_Point_here_?= <test@example.com>"
            )
        );
        assert_eq!(
            "Andr\u{e9}",
            decode_header("=?ISO-8859-1?Q?Andr=E9?=")
        );
        assert_eq!(
            "Giovanni Galli <test@example.com>",
            decode_header(
                "=?ISO-8859-1?B?R2lvdmFubmkgR2FsbGk=?= <test@example.com>"
            )
        );

        // The language suffix of RFC 2184 is ignored
        assert_eq!(
            "Keith Moore",
            decode_header("=?US-ASCII*EN?Q?Keith_Moore?=")
        );
    }

    #[test]
    fn adjacent_encoded_words_lose_their_separator() {
        assert_eq!(
            "If you can read this you understand the example.",
            decode_header(
                "=?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?= \
                 =?ISO-8859-1?B?dSB1bmRlcnN0YW5kIHRoZSBleGFtcGxlLg==?="
            )
        );
        assert_eq!(
            "First partSecond part",
            decode_header(
                "=?UTF-8?Q?First_part?= =?UTF-8?B?U2Vjb25kIHBhcnQ=?="
            )
        );
        assert_eq!(
            "FirstSecondThird",
            decode_header(
                "=?UTF-8?Q?First?= =?UTF-8?Q?Second?= \t\r\n=?UTF-8?Q?Third?="
            )
        );
    }

    #[test]
    fn surrounding_text_is_preserved() {
        assert_eq!(
            "Beginning rest of the string",
            decode_header("=?UTF-8?Q?Beginning?= rest of the string")
        );
        assert_eq!(
            "Start Middle End",
            decode_header("Start =?UTF-8?Q?Middle?= End")
        );
        assert_eq!(
            "Start of the string End",
            decode_header("Start of the string =?UTF-8?Q?End?=")
        );
    }

    #[test]
    fn unsupported_charset_leaves_whole_input_unchanged() {
        let koi8r = "=?KOI8-R?Q?=C3=CF=D7=C5=D4=2C_=D7=CF=D2=CF=C4=CE=C9=CA=21?= \
                     <test@example.com>";
        assert_eq!(koi8r, decode_header(koi8r));

        let invalid = "=?INVALID_ENCODING?Q?Test?=";
        assert_eq!(invalid, decode_header(invalid));
    }

    #[test]
    fn one_bad_word_poisons_the_whole_header() {
        // The valid word must NOT be decoded when a later word fails
        let mixed = "=?UTF-8?Q?Hi?= =?BOGUS?Q?x?=";
        assert_eq!(mixed, decode_header(mixed));

        let mixed = "=?BOGUS?Q?x?= =?UTF-8?Q?Hi?=";
        assert_eq!(mixed, decode_header(mixed));
    }

    #[test]
    fn malformed_words_leave_whole_input_unchanged() {
        // Unknown transfer encoding
        let unknown = "=?us-ascii?x?test?=";
        assert_eq!(unknown, decode_header(unknown));

        // Dangling Q escape
        let dangling = "=?UTF-8?Q?Test%=?=";
        assert_eq!(dangling, decode_header(dangling));

        // Non-hex Q escape
        let non_hex = "=?us-ascii?q?bad=ZZ?=";
        assert_eq!(non_hex, decode_header(non_hex));

        // Bad base64 payload
        let bad_b64 = "=?UTF-8?B?@@@@?=";
        assert_eq!(bad_b64, decode_header(bad_b64));

        // Payload that is not UTF-8 under a UTF-8 charset
        let bad_utf8 = "=?UTF-8?B?/w==?=";
        assert_eq!(bad_utf8, decode_header(bad_utf8));
    }

    #[test]
    fn incomplete_words_are_ordinary_text() {
        // Without the ?= terminator this is not an encoded word at all, so
        // it neither decodes nor poisons its neighbours.
        assert_eq!(
            "ok =?broken",
            decode_header("=?UTF-8?Q?ok?= =?broken")
        );
        assert_eq!(
            "too many fields =?a?q?b?c?=",
            decode_header("too many fields =?a?q?b?c?=")
        );
    }

    proptest! {
        #[test]
        fn decode_header_never_panics(
            s in r"(.|=\?(us-ascii|UTF-8|bogus)\?[qQbB]\?.*\?=| )*"
        ) {
            decode_header(&s);
        }
    }
}
