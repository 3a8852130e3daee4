/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::str::FromStr;

use super::Canonicalization;
use crate::{
    common::{
        crypto::{HashAlgorithm, HashOutput},
        headers::{Writable, Writer},
        parse::strip_signature,
    },
    AuthenticatedMessage, Error,
};

/// Canonical form of a message body, optionally truncated to the first
/// `length` canonical bytes.
pub struct CanonicalBody<'a> {
    canonicalization: Canonicalization,
    body: &'a [u8],
    length: Option<u64>,
}

impl Writable for CanonicalBody<'_> {
    fn write(self, writer: &mut impl Writer) {
        match self.length {
            Some(length) => self.write_canonical(&mut Truncate {
                inner: writer,
                remaining: length,
            }),
            None => self.write_canonical(writer),
        }
    }
}

impl CanonicalBody<'_> {
    fn write_canonical(&self, hasher: &mut impl Writer) {
        let mut crlf_seq = 0;

        match self.canonicalization {
            Canonicalization::Relaxed => {
                let mut last_ch = 0;
                let mut is_empty = true;

                for &ch in self.body {
                    match ch {
                        b' ' | b'\t' => {
                            while crlf_seq > 0 {
                                hasher.write(b"\r\n");
                                crlf_seq -= 1;
                            }
                            is_empty = false;
                        }
                        b'\n' => {
                            crlf_seq += 1;
                        }
                        b'\r' => {}
                        _ => {
                            while crlf_seq > 0 {
                                hasher.write(b"\r\n");
                                crlf_seq -= 1;
                            }

                            if last_ch == b' ' || last_ch == b'\t' {
                                hasher.write(b" ");
                            }

                            hasher.write(&[ch]);
                            is_empty = false;
                        }
                    }

                    last_ch = ch;
                }

                if !is_empty {
                    hasher.write(b"\r\n");
                }
            }
            Canonicalization::Simple => {
                for &ch in self.body {
                    match ch {
                        b'\n' => {
                            crlf_seq += 1;
                        }
                        b'\r' => {}
                        _ => {
                            while crlf_seq > 0 {
                                hasher.write(b"\r\n");
                                crlf_seq -= 1;
                            }
                            hasher.write(&[ch]);
                        }
                    }
                }

                hasher.write(b"\r\n");
            }
        }
    }

    /// Length of the canonical body, ignoring any truncation.
    pub fn canonical_len(&self) -> u64 {
        let mut len = 0;
        self.write_canonical(&mut Counter(&mut len));
        len as u64
    }
}

impl Canonicalization {
    pub fn canonicalize_headers<'a>(
        &self,
        headers: impl Iterator<Item = (&'a [u8], &'a [u8])>,
        hasher: &mut impl Writer,
    ) {
        match self {
            Canonicalization::Relaxed => {
                for (name, value) in headers {
                    for &ch in name {
                        if !ch.is_ascii_whitespace() {
                            hasher.write(&[ch.to_ascii_lowercase()]);
                        }
                    }

                    hasher.write(b":");
                    let mut bw = 0;
                    let mut last_ch = 0;

                    for &ch in value {
                        if !ch.is_ascii_whitespace() {
                            if [b' ', b'\t'].contains(&last_ch) && bw > 0 {
                                hasher.write_len(b" ", &mut bw);
                            }
                            hasher.write_len(&[ch], &mut bw);
                        }
                        last_ch = ch;
                    }

                    if last_ch == b'\n' {
                        hasher.write(b"\r\n");
                    }
                }
            }
            Canonicalization::Simple => {
                for (name, value) in headers {
                    hasher.write(name);
                    hasher.write(b":");
                    hasher.write(value);
                }
            }
        }
    }

    pub fn canonical_headers<'a>(
        &self,
        headers: Vec<(&'a [u8], &'a [u8])>,
    ) -> CanonicalHeaders<'a> {
        CanonicalHeaders {
            canonicalization: *self,
            headers,
        }
    }

    /// Canonical body truncated to `length` bytes after canonicalization.
    pub fn canonical_body<'a>(&self, body: &'a [u8], length: Option<u64>) -> CanonicalBody<'a> {
        CanonicalBody {
            canonicalization: *self,
            body,
            length,
        }
    }

    pub fn serialize_name(&self, writer: &mut impl Writer) {
        writer.write(self.as_str().as_bytes());
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Canonicalization::Relaxed => "relaxed",
            Canonicalization::Simple => "simple",
        }
    }

    /// Parses a `c=` value. A missing body part defaults to `simple`.
    pub fn parse_pair(value: &str) -> crate::Result<(Canonicalization, Canonicalization)> {
        let (ch, cb) = match value.split_once('/') {
            Some((ch, cb)) => (ch, cb),
            None => (value, "simple"),
        };
        Ok((ch.trim().parse()?, cb.trim().parse()?))
    }
}

impl FromStr for Canonicalization {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Canonicalization::Simple),
            "relaxed" => Ok(Canonicalization::Relaxed),
            _ => Err(Error::Validation("c", "unknown canonicalization")),
        }
    }
}

pub struct CanonicalHeaders<'a> {
    canonicalization: Canonicalization,
    headers: Vec<(&'a [u8], &'a [u8])>,
}

impl Writable for CanonicalHeaders<'_> {
    fn write(self, writer: &mut impl Writer) {
        self.canonicalization
            .canonicalize_headers(self.headers.into_iter(), writer)
    }
}

/// Picks the headers covered by an `h=` list.
///
/// Each name is matched from the bottom of the header block upwards. A
/// repeated name continues above the previous match for that name and names
/// with no remaining occurrence are skipped.
pub fn select_headers<'a, 'b>(
    headers: impl Iterator<Item = (&'a [u8], &'a [u8])>,
    include: impl IntoIterator<Item = &'b str>,
) -> Vec<(&'a [u8], &'a [u8])> {
    let headers = headers.collect::<Vec<_>>();
    let mut cursors: Vec<(&'b str, usize)> = Vec::new();
    let mut selected = Vec::new();

    for name in include {
        let pos = match cursors
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(pos) => pos,
            None => {
                cursors.push((name, headers.len()));
                cursors.len() - 1
            }
        };
        let mut i = cursors[pos].1;
        while i > 0 {
            i -= 1;
            if headers[i].0.eq_ignore_ascii_case(name.as_bytes()) {
                selected.push(headers[i]);
                break;
            }
        }
        cursors[pos].1 = i;
    }

    selected
}

/// Builds the exact byte stream covered by a header signature: the selected
/// headers followed by the signature header itself with its `b=` value
/// removed and trailing whitespace trimmed.
///
/// When `from` is signed one more `from` is looked up so that an unsigned
/// extra `From` header breaks the signature.
pub(crate) fn signed_data(
    message: &AuthenticatedMessage<'_>,
    include: &[String],
    canonicalization: Canonicalization,
    signature_header: (&[u8], &[u8]),
) -> Vec<u8> {
    let extra_from = include.iter().any(|h| h.eq_ignore_ascii_case("from"));
    let names = include
        .iter()
        .map(|h| h.as_str())
        .chain(extra_from.then_some("from"));

    let mut data = Vec::with_capacity(256);
    canonicalization
        .canonical_headers(select_headers(message.headers(), names))
        .write(&mut data);

    let unsigned = strip_signature(signature_header.1);
    let mut header = Vec::with_capacity(unsigned.len() + 32);
    canonicalization
        .canonicalize_headers([(signature_header.0, unsigned.as_slice())].into_iter(), &mut header);
    let end = header
        .iter()
        .rposition(|ch| !ch.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    data.extend_from_slice(&header[..end]);

    data
}

/// Hashes the canonical body, honouring `length` when present.
pub(crate) fn body_hash(
    body: &[u8],
    canonicalization: Canonicalization,
    length: Option<u64>,
    hash: HashAlgorithm,
) -> HashOutput {
    hash.hash(canonicalization.canonical_body(body, length))
}

struct Truncate<'a, W: Writer> {
    inner: &'a mut W,
    remaining: u64,
}

impl<W: Writer> Writer for Truncate<'_, W> {
    fn write(&mut self, buf: &[u8]) {
        let len = std::cmp::min(self.remaining, buf.len() as u64) as usize;
        if len > 0 {
            self.inner.write(&buf[..len]);
            self.remaining -= len as u64;
        }
    }
}

struct Counter<'a>(&'a mut usize);

impl Writer for Counter<'_> {
    fn write(&mut self, buf: &[u8]) {
        *self.0 += buf.len();
    }
}
