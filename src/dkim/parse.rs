/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use crate::{
    common::{
        crypto::Algorithm,
        parse::{decode_base64, header_list, number, strip_whitespace, TagValueList},
    },
    Error,
};

use super::{Canonicalization, Signature};

pub(crate) const DKIM_MANDATORY: &[&str] = &["v", "a", "b", "bh", "d", "h", "s"];

impl Signature {
    /// Parses and validates the value of a `DKIM-Signature` header.
    pub fn parse(header: &[u8]) -> crate::Result<Self> {
        let tags = TagValueList::decode(header)?;
        validate_fields(&tags, DKIM_MANDATORY, false)?;

        let mut signature = Signature {
            v: 1,
            ..Default::default()
        };

        for (tag, value) in tags.iter() {
            match tag {
                b"v" => signature.v = 1,
                b"a" => signature.a = algorithm(value, false)?,
                b"d" => signature.d = text(value),
                b"s" => signature.s = text(value),
                b"b" => signature.b = decode_base64(value)?,
                b"bh" => signature.bh = decode_base64(value)?,
                b"h" => signature.h = signed_headers(value),
                b"i" => signature.i = text(value),
                b"l" => signature.l = body_length(value)?,
                b"t" => signature.t = number(value),
                b"x" => signature.x = number(value),
                b"c" => {
                    (signature.ch, signature.cb) = Canonicalization::parse_pair(&text(value))?;
                }
                b"q" => (),
                _ => signature.unknown.push((text(tag), text(value))),
            }
        }

        Ok(signature)
    }
}

/// Checks the fields shared by `DKIM-Signature`, `ARC-Message-Signature` and
/// `ARC-Seal` headers.
///
/// `t=` and `x=` must be numeric but are not compared against the clock.
pub(crate) fn validate_fields(
    tags: &TagValueList<'_>,
    mandatory: &[&'static str],
    arc: bool,
) -> crate::Result<()> {
    for &field in mandatory {
        if !tags.contains(field) {
            return Err(Error::Validation(field, "missing"));
        }
    }

    if let Some(a) = tags.get("a") {
        algorithm(a, arc)?;
    }

    for field in ["b", "bh"] {
        if let Some(value) = tags.get(field) {
            if !is_base64(value) {
                return Err(Error::Validation(field, "not valid base64"));
            }
        }
    }

    if let Some(cv) = tags.get("cv") {
        if !matches!(cv, b"pass" | b"fail" | b"none") {
            return Err(Error::Validation("cv", "not pass, fail or none"));
        }
    }

    let d = tags.get("d");
    if let Some(d) = d.filter(|d| d.is_ascii()) {
        if d.iter().any(|ch| b"()<>[]:;@\\,".contains(ch)) {
            return Err(Error::Validation("d", "contains special characters"));
        }
    }

    if !arc {
        if let (Some(i), Some(d)) = (tags.get("i"), d) {
            if !is_sub_identity(i, d) {
                return Err(Error::Validation("i", "not a subdomain of d="));
            }
        }
    }

    if let Some(l) = tags.get("l") {
        if l.len() > 76 || !l.iter().all(u8::is_ascii_digit) {
            return Err(Error::Validation("l", "not a decimal integer"));
        }
    }

    if let Some(q) = tags.get("q") {
        if q != b"dns/txt" {
            return Err(Error::Validation("q", "not dns/txt"));
        }
    }

    for field in ["t", "x"] {
        if let Some(value) = tags.get(field) {
            if number(value).is_none() {
                return Err(Error::Validation(field, "not a decimal integer"));
            }
        }
    }

    if let Some(v) = tags.get("v") {
        if v != b"1" {
            return Err(Error::Validation("v", "not 1"));
        }
    }

    Ok(())
}

/// ARC only allows `rsa-sha256`.
pub(crate) fn algorithm(value: &[u8], arc: bool) -> crate::Result<Algorithm> {
    let algorithm = std::str::from_utf8(value)
        .map_err(|_| Error::Validation("a", "unknown signature algorithm"))?
        .parse::<Algorithm>()?;
    if arc && algorithm != Algorithm::RsaSha256 {
        Err(Error::Validation("a", "unknown signature algorithm"))
    } else {
        Ok(algorithm)
    }
}

/// An empty `l=` is the same as no `l=`.
pub(crate) fn body_length(value: &[u8]) -> crate::Result<Option<u64>> {
    if value.is_empty() {
        Ok(None)
    } else {
        number(value)
            .map(Some)
            .ok_or(Error::Validation("l", "does not fit in 64 bits"))
    }
}

pub(crate) fn text(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

pub(crate) fn signed_headers(value: &[u8]) -> Vec<String> {
    header_list(value)
        .into_iter()
        .map(|h| h.to_ascii_lowercase())
        .collect()
}

// [\s0-9A-Za-z+/]+[\s=]*
fn is_base64(value: &[u8]) -> bool {
    let split = value
        .iter()
        .position(|&ch| ch == b'=')
        .unwrap_or(value.len());
    let (data, padding) = value.split_at(split);

    !data.is_empty()
        && data.iter().all(|&ch| {
            ch.is_ascii_alphanumeric() || matches!(ch, b'+' | b'/' | b' ' | b'\t' | b'\r' | b'\n')
        })
        && padding
            .iter()
            .all(|&ch| ch == b'=' || ch.is_ascii_whitespace())
        && strip_whitespace(value).len() % 4 == 0
}

fn is_sub_identity(i: &[u8], d: &[u8]) -> bool {
    i.len() > d.len()
        && i[i.len() - d.len()..].eq_ignore_ascii_case(d)
        && matches!(i[i.len() - d.len() - 1], b'@' | b'.')
}
