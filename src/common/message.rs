/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::{borrow::Cow, ops::Range};

use crate::{AuthenticatedMessage, Error};

impl<'x> AuthenticatedMessage<'x> {
    /// Splits a raw message into headers and body.
    ///
    /// Continuation lines are folded into the preceding header value and mbox
    /// `From ` separator lines are skipped. Any other line that is not of the
    /// form `name:value` is rejected.
    pub fn parse(raw_message: &'x [u8]) -> crate::Result<Self> {
        let raw = normalize_line_endings(raw_message);
        let mut headers: Vec<(Range<usize>, Range<usize>)> = Vec::new();
        let mut body_offset = raw.len();
        let mut pos = 0;

        while pos < raw.len() {
            let (line_end, next_line) = match raw[pos..].windows(2).position(|w| w == b"\r\n") {
                Some(offset) => (pos + offset, pos + offset + 2),
                None => (raw.len(), raw.len()),
            };
            let line = &raw[pos..line_end];

            if line.is_empty() {
                body_offset = next_line;
                break;
            } else if matches!(line[0], b' ' | b'\t') {
                match headers.last_mut() {
                    Some((_, value)) => value.end = next_line,
                    None => {
                        return Err(Error::MessageFormat(
                            "continuation line before first header".to_string(),
                        ));
                    }
                }
            } else if let Some(colon) = header_name_len(line) {
                headers.push((pos..pos + colon, pos + colon + 1..next_line));
            } else if !line.starts_with(b"From ") {
                return Err(Error::MessageFormat(format!(
                    "unexpected characters in RFC822 header: {:?}",
                    String::from_utf8_lossy(line)
                )));
            }

            pos = next_line;
        }

        Ok(AuthenticatedMessage {
            raw,
            headers,
            body_offset,
        })
    }

    /// Headers in message order as `(name, value)` pairs. Values include the
    /// trailing CRLF and any folded continuation lines.
    pub fn headers(&self) -> impl DoubleEndedIterator<Item = (&[u8], &[u8])> + '_ {
        self.headers
            .iter()
            .map(|(name, value)| (&self.raw[name.clone()], &self.raw[value.clone()]))
    }

    /// Headers matching `name` case-insensitively, in message order.
    pub fn headers_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        self.headers()
            .filter(move |(hdr_name, _)| hdr_name.eq_ignore_ascii_case(name.as_bytes()))
    }

    pub fn body(&self) -> &[u8] {
        self.raw.get(self.body_offset..).unwrap_or_default()
    }

    pub fn raw_message(&self) -> &[u8] {
        &self.raw
    }

    pub fn header_count(&self) -> usize {
        self.headers.len()
    }
}

fn header_name_len(line: &[u8]) -> Option<usize> {
    let colon = line.iter().position(|&ch| ch == b':')?;
    if colon > 0 && line[..colon].iter().all(|ch| (0x21..=0x7e).contains(ch)) {
        Some(colon)
    } else {
        None
    }
}

pub(crate) fn normalize_line_endings(raw: &[u8]) -> Cow<'_, [u8]> {
    let has_bare_lf = raw
        .iter()
        .enumerate()
        .any(|(pos, &ch)| ch == b'\n' && (pos == 0 || raw[pos - 1] != b'\r'));
    if !has_bare_lf {
        return Cow::Borrowed(raw);
    }

    let mut normalized = Vec::with_capacity(raw.len() + raw.len() / 32);
    let mut last_ch = 0;
    for &ch in raw {
        if ch == b'\n' && last_ch != b'\r' {
            normalized.push(b'\r');
        }
        normalized.push(ch);
        last_ch = ch;
    }
    Cow::Owned(normalized)
}

#[cfg(test)]
mod test {
    use crate::{AuthenticatedMessage, Error};

    #[test]
    fn parse_message() {
        for (message, headers, body) in [
            (
                "From: a\nTo: b\nEmpty:\nMulti: 1\n 2\nSubject: c\n\nNot-header: ignore\n",
                vec![
                    ("From", " a\r\n"),
                    ("To", " b\r\n"),
                    ("Empty", "\r\n"),
                    ("Multi", " 1\r\n 2\r\n"),
                    ("Subject", " c\r\n"),
                ],
                "Not-header: ignore\r\n",
            ),
            (
                concat!(
                    "From someone@example.org Mon Jan  1 00:00:00 2024\r\n",
                    "A: X\r\n",
                    "B: Y\t\r\n",
                    "\tZ  \r\n",
                    "\r\n",
                    " C \r\n",
                    "D \t E\r\n"
                ),
                vec![("A", " X\r\n"), ("B", " Y\t\r\n\tZ  \r\n")],
                " C \r\nD \t E\r\n",
            ),
            (
                "Subject: no body\r\n",
                vec![("Subject", " no body\r\n")],
                "",
            ),
            ("X-Empty-Body: 1\r\n\r\n", vec![("X-Empty-Body", " 1\r\n")], ""),
        ] {
            let parsed = AuthenticatedMessage::parse(message.as_bytes()).unwrap();
            assert_eq!(
                parsed
                    .headers()
                    .map(|(h, v)| {
                        (
                            std::str::from_utf8(h).unwrap(),
                            std::str::from_utf8(v).unwrap(),
                        )
                    })
                    .collect::<Vec<_>>(),
                headers
            );
            assert_eq!(std::str::from_utf8(parsed.body()).unwrap(), body);
        }
    }

    #[test]
    fn reject_malformed_headers() {
        for message in [
            " leading continuation\r\nA: b\r\n\r\n",
            "Not a header\r\n\r\nbody",
            ": no name\r\n\r\n",
        ] {
            assert!(
                matches!(
                    AuthenticatedMessage::parse(message.as_bytes()),
                    Err(Error::MessageFormat(_))
                ),
                "{message:?}"
            );
        }
    }

    #[test]
    fn headers_named() {
        let message = AuthenticatedMessage::parse(
            b"DKIM-Signature: one\r\nFrom: a\r\ndkim-signature: two\r\n\r\n",
        )
        .unwrap();
        assert_eq!(
            message
                .headers_named("DKIM-Signature")
                .map(|(_, v)| v)
                .collect::<Vec<_>>(),
            vec![&b" one\r\n"[..], &b" two\r\n"[..]]
        );
        assert_eq!(message.header_count(), 3);
    }
}
