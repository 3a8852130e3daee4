/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::fmt::{Display, Formatter};

use crate::common::{
    headers::{HeaderWriter, Writer},
    parse::{encode_base64, write_tags, DEFAULT_FOLD_AT},
};

use super::Signature;

pub(crate) const HEADER_NAME: &str = "DKIM-Signature";

impl Signature {
    /// Writes the header value, starting with the space that follows the
    /// colon and without the trailing CRLF.
    pub fn write_value(&self, writer: &mut impl Writer) {
        let c = format!("{}/{}", self.ch.as_str(), self.cb.as_str());
        let h = self.h.join(":");
        let numbers = [("l", self.l), ("t", self.t), ("x", self.x)]
            .into_iter()
            .filter_map(|(tag, value)| value.map(|value| (tag, value.to_string())))
            .collect::<Vec<_>>();
        let bh = encode_base64(&self.bh).unwrap_or_default();
        let b = encode_base64(&self.b).unwrap_or_default();

        let mut tags: Vec<(&str, &[u8])> = vec![
            ("v", b"1"),
            ("a", self.a.as_str().as_bytes()),
            ("c", c.as_bytes()),
            ("d", self.d.as_bytes()),
            ("s", self.s.as_bytes()),
            ("h", h.as_bytes()),
        ];
        if !self.i.is_empty() {
            tags.push(("i", self.i.as_bytes()));
        }
        for (tag, value) in &numbers {
            tags.push((*tag, value.as_bytes()));
        }
        for (tag, value) in &self.unknown {
            tags.push((tag.as_str(), value.as_bytes()));
        }
        tags.push(("bh", bh.as_slice()));
        tags.push(("b", b.as_slice()));

        writer.write(b" ");
        write_tags(writer, &tags, HEADER_NAME.len() + 2, DEFAULT_FOLD_AT);
    }

    pub(crate) fn header_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(512);
        self.write_value(&mut value);
        value
    }
}

impl HeaderWriter for Signature {
    fn write_header(&self, writer: &mut impl Writer) {
        writer.write(HEADER_NAME.as_bytes());
        writer.write(b":");
        self.write_value(writer);
        writer.write(b"\r\n");
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = self.header_value();
        f.write_str(String::from_utf8_lossy(&value).trim_start())
    }
}
