/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use crate::{Dsp, Error};

use super::{
    crypto::{Algorithm, HashAlgorithm, VerifyingKey, VerifyingKeyType},
    parse::{decode_base64, TagValueList, TxtRecordParser},
};

pub(crate) const R_HASH_SHA1: u64 = 0x01;
pub(crate) const R_HASH_SHA256: u64 = 0x02;
pub(crate) const R_SVC_ALL: u64 = 0x04;
pub(crate) const R_SVC_EMAIL: u64 = 0x08;
pub(crate) const R_SVC_TLSRPT: u64 = 0x10;
pub(crate) const R_FLAG_TESTING: u64 = 0x20;
pub(crate) const R_FLAG_MATCH_DOMAIN: u64 = 0x40;

const R_HASH_MASK: u64 = R_HASH_SHA1 | R_HASH_SHA256;

/// A DKIM public key record (`selector._domainkey.domain` TXT).
pub struct DomainKey {
    /// `None` when the record publishes an empty `p=`.
    pub(crate) p: Option<Box<dyn VerifyingKey + Send + Sync>>,
    pub(crate) f: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    All,
    Email,
    TlsRpt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Testing,
    MatchDomain,
}

impl From<Service> for u64 {
    fn from(value: Service) -> Self {
        match value {
            Service::All => R_SVC_ALL,
            Service::Email => R_SVC_EMAIL,
            Service::TlsRpt => R_SVC_TLSRPT,
        }
    }
}

impl From<Flag> for u64 {
    fn from(value: Flag) -> Self {
        match value {
            Flag::Testing => R_FLAG_TESTING,
            Flag::MatchDomain => R_FLAG_MATCH_DOMAIN,
        }
    }
}

impl From<HashAlgorithm> for u64 {
    fn from(value: HashAlgorithm) -> Self {
        match value {
            HashAlgorithm::Sha1 => R_HASH_SHA1,
            HashAlgorithm::Sha256 => R_HASH_SHA256,
            HashAlgorithm::Sha512 => 0,
        }
    }
}

impl TxtRecordParser for DomainKey {
    fn parse(record: &[u8]) -> crate::Result<Self> {
        let tags = TagValueList::decode(record)
            .map_err(|_| Error::KeyFormat("invalid tag-value list".to_string()))?;

        if let Some(v) = tags.get("v") {
            if v != b"DKIM1" {
                return Err(Error::KeyFormat("unsupported record version".to_string()));
            }
        }

        let key_type = match tags.get("k") {
            None => VerifyingKeyType::Rsa,
            Some(k) if k.eq_ignore_ascii_case(b"rsa") => VerifyingKeyType::Rsa,
            Some(k) if k.eq_ignore_ascii_case(b"ed25519") => VerifyingKeyType::Ed25519,
            Some(_) => return Err(Error::UnknownKeyType),
        };

        let mut flags = 0;
        if let Some(h) = tags.get("h") {
            flags |= items(h, |item| match item.to_ascii_lowercase().as_slice() {
                b"sha1" => R_HASH_SHA1,
                b"sha256" => R_HASH_SHA256,
                _ => 0,
            });
        }
        match tags.get("s") {
            Some(s) => {
                flags |= items(s, |item| match item.to_ascii_lowercase().as_slice() {
                    b"*" => R_SVC_ALL,
                    b"email" => R_SVC_EMAIL,
                    b"tlsrpt" => R_SVC_TLSRPT,
                    _ => 0,
                })
            }
            None => flags |= R_SVC_ALL,
        }
        if let Some(t) = tags.get("t") {
            flags |= items(t, |item| match item.to_ascii_lowercase().as_slice() {
                b"y" => R_FLAG_TESTING,
                b"s" => R_FLAG_MATCH_DOMAIN,
                _ => 0,
            });
        }

        let p = tags
            .get("p")
            .ok_or_else(|| Error::KeyFormat("missing p= tag".to_string()))?;
        let p = if p.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            let bytes =
                decode_base64(p).map_err(|_| Error::KeyFormat("invalid base64 in p=".to_string()))?;
            Some(key_type.verifying_key(&bytes)?)
        };

        Ok(DomainKey { p, f: flags })
    }
}

impl DomainKey {
    pub fn has_flag(&self, flag: impl Into<u64>) -> bool {
        (self.f & flag.into()) != 0
    }

    pub fn is_revoked(&self) -> bool {
        self.p.is_none()
    }

    /// True when the record restricts itself to TLS reports (`s=tlsrpt`).
    pub fn is_tlsrpt_only(&self) -> bool {
        self.has_flag(Service::TlsRpt) && !self.has_flag(R_SVC_EMAIL | R_SVC_ALL)
    }

    pub fn accepts_hash(&self, hash: HashAlgorithm) -> bool {
        (self.f & R_HASH_MASK) == 0 || self.has_flag(hash)
    }

    pub fn key_bits(&self) -> Option<usize> {
        self.p.as_ref().map(|p| p.key_bits())
    }

    pub fn key_type(&self) -> Option<VerifyingKeyType> {
        self.p.as_ref().map(|p| p.key_type())
    }
}

impl std::fmt::Debug for DomainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainKey")
            .field("key_type", &self.key_type())
            .field("key_bits", &self.key_bits())
            .field("flags", &self.f)
            .finish()
    }
}

pub(crate) trait VerifySignature {
    fn selector(&self) -> &str;

    fn domain(&self) -> &str;

    fn signature(&self) -> &[u8];

    fn algorithm(&self) -> Algorithm;

    fn dsp(&self) -> Dsp {
        Dsp::new(self.domain(), self.selector())
    }

    fn domain_key(&self) -> String {
        let s = self.selector();
        let d = self.domain();
        let mut key = String::with_capacity(s.len() + d.len() + 13);
        key.push_str(s);
        key.push_str("._domainkey.");
        key.push_str(d);
        key.push('.');
        key
    }

    fn verify(&self, record: &DomainKey, signed_data: &[u8]) -> crate::Result<()> {
        let algorithm = self.algorithm();
        match &record.p {
            Some(key) => {
                if key.key_type() != algorithm.key_type()
                    || !record.accepts_hash(algorithm.hash_algorithm())
                {
                    Err(Error::IncompatibleAlgorithms)
                } else {
                    key.verify(signed_data, self.signature(), algorithm)
                }
            }
            None => Err(Error::RevokedPublicKey),
        }
    }
}

fn items(value: &[u8], flag: impl Fn(&[u8]) -> u64) -> u64 {
    value
        .split(|&ch| ch == b':')
        .map(|item| flag(super::parse::trim(item)))
        .fold(0, |acc, f| acc | f)
}
