/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use crate::{
    common::parse::{decode_base64, number, trim, TagValueList},
    dkim::{
        parse::{algorithm, body_length, signed_headers, text, validate_fields},
        Canonicalization,
    },
    Error,
};

use super::{ChainValidation, Results, Seal, Signature, MAX_INSTANCE};

pub(crate) const AMS_MANDATORY: &[&str] = &["i", "a", "b", "bh", "d", "h", "s"];
pub(crate) const AS_MANDATORY: &[&str] = &["i", "a", "b", "cv", "d", "s"];

impl Signature {
    /// Parses and validates the value of an `ARC-Message-Signature` header.
    pub fn parse(header: &[u8]) -> crate::Result<Self> {
        let tags = TagValueList::decode(header)?;
        validate_fields(&tags, AMS_MANDATORY, true)?;

        let mut signature = Signature::default();
        for (tag, value) in tags.iter() {
            match tag {
                b"i" => signature.i = instance(value)?,
                b"a" => signature.a = algorithm(value, true)?,
                b"d" => signature.d = text(value),
                b"s" => signature.s = text(value),
                b"b" => signature.b = decode_base64(value)?,
                b"bh" => signature.bh = decode_base64(value)?,
                b"h" => signature.h = signed_headers(value),
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

impl Seal {
    /// Parses and validates the value of an `ARC-Seal` header.
    pub fn parse(header: &[u8]) -> crate::Result<Self> {
        let tags = TagValueList::decode(header)?;
        if tags.contains("h") {
            return Err(Error::ArcHasHeaderTag);
        }
        validate_fields(&tags, AS_MANDATORY, true)?;

        let mut seal = Seal::default();
        for (tag, value) in tags.iter() {
            match tag {
                b"i" => seal.i = instance(value)?,
                b"a" => seal.a = algorithm(value, true)?,
                b"d" => seal.d = text(value),
                b"s" => seal.s = text(value),
                b"b" => seal.b = decode_base64(value)?,
                b"t" => seal.t = number(value),
                b"cv" => {
                    seal.cv = match value {
                        b"pass" => ChainValidation::Pass,
                        b"fail" => ChainValidation::Fail,
                        b"none" => ChainValidation::None,
                        _ => return Err(Error::ArcInvalidCV),
                    }
                }
                _ => seal.unknown.push((text(tag), text(value))),
            }
        }

        Ok(seal)
    }
}

impl Results {
    /// Reads the leading `i=` of an `ARC-Authentication-Results` value. The
    /// rest is an RFC 8601 payload and is not interpreted.
    pub fn parse(header: &[u8]) -> crate::Result<Self> {
        let first = header
            .split(|&ch| ch == b';')
            .next()
            .map(trim)
            .unwrap_or_default();
        match first.split_first() {
            Some((b'i' | b'I', rest)) => {
                let rest = trim(rest);
                match rest.split_first() {
                    Some((b'=', value)) => Ok(Results {
                        i: instance(trim(value))?,
                    }),
                    _ => Err(Error::Validation("i", "missing")),
                }
            }
            _ => Err(Error::Validation("i", "missing")),
        }
    }
}

fn instance(value: &[u8]) -> crate::Result<u32> {
    match number(value) {
        Some(i) if (1..=MAX_INSTANCE as u64).contains(&i) => Ok(i as u32),
        Some(i) => Err(Error::ArcInvalidInstance(i.min(u32::MAX as u64) as u32)),
        None => Err(Error::ArcInvalidInstance(0)),
    }
}
