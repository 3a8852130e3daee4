/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use mail_parser::decoders::base64::base64_decode;

use crate::Error;

use super::headers::Writer;

/// Column at which serialized tag lists are folded.
pub const DEFAULT_FOLD_AT: usize = 76;

pub trait TxtRecordParser: Sized {
    fn parse(record: &[u8]) -> crate::Result<Self>;
}

/// A decoded `tag=value; tag=value` list.
///
/// Values are borrowed from the input with surrounding whitespace removed.
/// When a tag is repeated the last occurrence wins while the position of the
/// first one is kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagValueList<'x> {
    tags: Vec<(&'x [u8], &'x [u8])>,
}

impl<'x> TagValueList<'x> {
    pub fn decode(input: &'x [u8]) -> crate::Result<Self> {
        let mut tags: Vec<(&'x [u8], &'x [u8])> = Vec::new();

        for segment in input.split(|&ch| ch == b';') {
            let segment = trim(segment);
            if segment.is_empty() {
                continue;
            }
            let eq = segment
                .iter()
                .position(|&ch| ch == b'=')
                .ok_or(Error::InvalidTagValueList)?;
            let name = trim(&segment[..eq]);
            let value = trim(&segment[eq + 1..]);

            if !is_tag_name(name) {
                return Err(Error::InvalidTagValueList);
            }

            if let Some(entry) = tags.iter_mut().find(|(tag, _)| *tag == name) {
                entry.1 = value;
            } else {
                tags.push((name, value));
            }
        }

        Ok(TagValueList { tags })
    }

    pub fn get(&self, tag: &str) -> Option<&'x [u8]> {
        self.tags
            .iter()
            .find(|(name, _)| *name == tag.as_bytes())
            .map(|(_, value)| *value)
    }

    pub fn get_str(&self, tag: &str) -> Option<&'x str> {
        self.get(tag).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'x [u8], &'x [u8])> + '_ {
        self.tags.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Writes `tags` in the given order, folding with `\r\n ` whenever a line
/// would grow past `fold_at` columns. `b` and `bh` values are split anywhere,
/// `h` values only at `:` separators and every other value is kept whole.
pub fn write_tags(writer: &mut impl Writer, tags: &[(&str, &[u8])], start_col: usize, fold_at: usize) {
    let mut bw = start_col;

    for (num, (tag, value)) in tags.iter().enumerate() {
        let splittable = matches!(*tag, "b" | "bh");
        if num > 0 {
            writer.write_len(b";", &mut bw);
            let piece_len = tag.len() + 1 + if splittable { 0 } else { value.len() };
            if bw + 1 + piece_len > fold_at {
                writer.write(b"\r\n ");
                bw = 1;
            } else {
                writer.write_len(b" ", &mut bw);
            }
        }
        writer.write_len(tag.as_bytes(), &mut bw);
        writer.write_len(b"=", &mut bw);

        match *tag {
            "b" | "bh" => {
                for &byte in value.iter() {
                    if bw >= fold_at {
                        writer.write(b"\r\n ");
                        bw = 1;
                    }
                    writer.write_len(&[byte], &mut bw);
                }
            }
            "h" => {
                for (num, item) in value.split(|&ch| ch == b':').enumerate() {
                    if num > 0 {
                        writer.write_len(b":", &mut bw);
                        if bw + item.len() > fold_at {
                            writer.write(b"\r\n ");
                            bw = 1;
                        }
                    }
                    writer.write_len(item, &mut bw);
                }
            }
            _ => writer.write_len(value, &mut bw),
        }
    }

    writer.write(b";");
}

/// Removes the value of the `b=` tag, keeping the tag itself, and drops the
/// trailing CRLF of the header.
pub fn strip_signature(value: &[u8]) -> Vec<u8> {
    let mut unsigned = Vec::with_capacity(value.len());
    let mut iter = value.iter().enumerate();
    let mut last_ch = b';';
    while let Some((pos, &ch)) = iter.next() {
        match ch {
            b'=' if last_ch == b'b' => {
                unsigned.push(ch);
                #[allow(clippy::while_let_on_iterator)]
                while let Some((_, &ch)) = iter.next() {
                    if ch == b';' {
                        unsigned.push(b';');
                        break;
                    }
                }
                last_ch = 0;
            }
            b'b' | b'B' if last_ch == b';' => {
                last_ch = b'b';
                unsigned.push(ch);
            }
            b';' => {
                last_ch = b';';
                unsigned.push(ch);
            }
            b'\r' if pos + 2 == value.len() => (),
            b'\n' if pos + 1 == value.len() => (),
            _ => {
                unsigned.push(ch);
                if !ch.is_ascii_whitespace() {
                    last_ch = 0;
                }
            }
        }
    }
    unsigned
}

pub(crate) fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|ch| !ch.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|ch| !ch.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    &bytes[start..end]
}

pub(crate) fn strip_whitespace(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .copied()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect()
}

pub(crate) fn decode_base64(bytes: &[u8]) -> crate::Result<Vec<u8>> {
    base64_decode(&strip_whitespace(bytes)).ok_or(Error::Base64)
}

pub(crate) fn encode_base64(bytes: &[u8]) -> crate::Result<Vec<u8>> {
    mail_builder::encoders::base64::base64_encode(bytes).map_err(Error::from)
}

/// Splits a colon separated header list, trimming folding whitespace.
pub(crate) fn header_list(value: &[u8]) -> Vec<String> {
    value
        .split(|&ch| ch == b':')
        .map(trim)
        .filter(|item| !item.is_empty())
        .map(|item| String::from_utf8_lossy(item).into_owned())
        .collect()
}

pub(crate) fn number(value: &[u8]) -> Option<u64> {
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(value).ok()?.parse().ok()
}

fn is_tag_name(name: &[u8]) -> bool {
    name.first().map_or(false, u8::is_ascii_alphabetic)
        && name
            .iter()
            .all(|&ch| ch.is_ascii_alphanumeric() || ch == b'_')
}
