/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use crate::{
    common::{
        headers::{HeaderWriter, Writer},
        parse::{encode_base64, write_tags, DEFAULT_FOLD_AT},
    },
    AuthenticationResults,
};

use super::{ArcSet, Seal, Signature};

pub(crate) const AMS_HEADER: &str = "ARC-Message-Signature";
pub(crate) const AS_HEADER: &str = "ARC-Seal";
pub(crate) const AAR_HEADER: &str = "ARC-Authentication-Results";

impl Signature {
    pub fn write_value(&self, writer: &mut impl Writer) {
        let i = self.i.to_string();
        let c = format!("{}/{}", self.ch.as_str(), self.cb.as_str());
        let h = self.h.join(":");
        let numbers = [("t", self.t), ("x", self.x), ("l", self.l)]
            .into_iter()
            .filter_map(|(tag, value)| value.map(|value| (tag, value.to_string())))
            .collect::<Vec<_>>();
        let bh = encode_base64(&self.bh).unwrap_or_default();
        let b = encode_base64(&self.b).unwrap_or_default();

        let mut tags: Vec<(&str, &[u8])> = vec![
            ("i", i.as_bytes()),
            ("a", self.a.as_str().as_bytes()),
            ("c", c.as_bytes()),
            ("d", self.d.as_bytes()),
            ("s", self.s.as_bytes()),
            ("h", h.as_bytes()),
        ];
        for (tag, value) in &numbers {
            tags.push((*tag, value.as_bytes()));
        }
        for (tag, value) in &self.unknown {
            tags.push((tag.as_str(), value.as_bytes()));
        }
        tags.push(("bh", bh.as_slice()));
        tags.push(("b", b.as_slice()));

        writer.write(b" ");
        write_tags(writer, &tags, AMS_HEADER.len() + 2, DEFAULT_FOLD_AT);
    }

    pub(crate) fn header_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(512);
        self.write_value(&mut value);
        value
    }
}

impl Seal {
    pub fn write_value(&self, writer: &mut impl Writer) {
        let i = self.i.to_string();
        let t = self.t.map(|t| t.to_string());
        let b = encode_base64(&self.b).unwrap_or_default();

        let mut tags: Vec<(&str, &[u8])> = vec![
            ("i", i.as_bytes()),
            ("a", self.a.as_str().as_bytes()),
            ("cv", self.cv.as_str().as_bytes()),
            ("d", self.d.as_bytes()),
            ("s", self.s.as_bytes()),
        ];
        if let Some(t) = &t {
            tags.push(("t", t.as_bytes()));
        }
        for (tag, value) in &self.unknown {
            tags.push((tag.as_str(), value.as_bytes()));
        }
        tags.push(("b", b.as_slice()));

        writer.write(b" ");
        write_tags(writer, &tags, AS_HEADER.len() + 2, DEFAULT_FOLD_AT);
    }

    pub(crate) fn header_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(256);
        self.write_value(&mut value);
        value
    }
}

impl AuthenticationResults<'_> {
    /// Writes the `ARC-Authentication-Results` value for instance `i`.
    pub(crate) fn write_arc_value(&self, writer: &mut impl Writer, i: u32) {
        writer.write(b" i=");
        writer.write(i.to_string().as_bytes());
        writer.write(b"; ");
        writer.write(self.hostname.as_bytes());
        if !self.auth_results.is_empty() {
            writer.write(self.auth_results.as_bytes());
        } else {
            writer.write(b"; none");
        }
    }

    pub(crate) fn arc_header_value(&self, i: u32) -> Vec<u8> {
        let mut value = Vec::with_capacity(self.auth_results.len() + 64);
        self.write_arc_value(&mut value, i);
        value
    }
}

impl HeaderWriter for ArcSet<'_> {
    fn write_header(&self, writer: &mut impl Writer) {
        writer.write(AS_HEADER.as_bytes());
        writer.write(b":");
        self.seal.write_value(writer);
        writer.write(b"\r\n");

        writer.write(AMS_HEADER.as_bytes());
        writer.write(b":");
        self.signature.write_value(writer);
        writer.write(b"\r\n");

        writer.write(AAR_HEADER.as_bytes());
        writer.write(b":");
        self.results.write_arc_value(writer, self.seal.i);
        writer.write(b"\r\n");
    }
}
