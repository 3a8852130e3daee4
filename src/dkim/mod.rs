/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::time::Duration;

use crate::common::{
    crypto::{Algorithm, SigningKey},
    verify::VerifySignature,
};

pub mod builder;
pub mod canonicalize;
pub mod headers;
pub mod parse;
pub mod sign;
pub mod verify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Canonicalization {
    Relaxed,
    #[default]
    Simple,
}

/// Typestate builder producing `DKIM-Signature` headers.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DkimSigner<T: SigningKey, State = NeedDomain> {
    _state: std::marker::PhantomData<State>,
    pub(crate) key: T,
    pub(crate) template: Signature,
    pub(crate) tlsrpt: bool,
}

#[doc(hidden)]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct NeedDomain;

#[doc(hidden)]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct NeedSelector;

#[doc(hidden)]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct NeedHeaders;

#[doc(hidden)]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Done;

/// A parsed and validated `DKIM-Signature` header.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Signature {
    pub(crate) v: u32,
    pub(crate) a: Algorithm,
    pub(crate) d: String,
    pub(crate) s: String,
    pub(crate) b: Vec<u8>,
    pub(crate) bh: Vec<u8>,
    pub(crate) h: Vec<String>,
    pub(crate) i: String,
    pub(crate) l: Option<u64>,
    pub(crate) x: Option<u64>,
    pub(crate) t: Option<u64>,
    pub(crate) ch: Canonicalization,
    pub(crate) cb: Canonicalization,
    pub(crate) unknown: Vec<(String, String)>,
}

/// How a message relates to RFC 8460 TLS reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsRpt {
    /// Regular mail. Keys restricted to `s=tlsrpt` are rejected.
    #[default]
    Off,
    /// A TLS report. `l=` is ignored.
    On,
    /// A TLS report whose key must carry the `tlsrpt` service type.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyConfig {
    pub(crate) min_key_bits: usize,
    pub(crate) timeout: Duration,
    pub(crate) tlsrpt: TlsRpt,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        VerifyConfig {
            min_key_bits: 1024,
            timeout: Duration::from_secs(5),
            tlsrpt: TlsRpt::Off,
        }
    }
}

impl VerifyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest RSA modulus accepted, in bits.
    pub fn with_min_key_bits(mut self, min_key_bits: usize) -> Self {
        self.min_key_bits = min_key_bits;
        self
    }

    /// Deadline for each key lookup.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tlsrpt(mut self, tlsrpt: TlsRpt) -> Self {
        self.tlsrpt = tlsrpt;
        self
    }

    pub fn min_key_bits(&self) -> usize {
        self.min_key_bits
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn tlsrpt(&self) -> TlsRpt {
        self.tlsrpt
    }
}

impl VerifySignature for Signature {
    fn selector(&self) -> &str {
        &self.s
    }

    fn domain(&self) -> &str {
        &self.d
    }

    fn signature(&self) -> &[u8] {
        &self.b
    }

    fn algorithm(&self) -> Algorithm {
        self.a
    }
}

impl Signature {
    pub fn algorithm(&self) -> Algorithm {
        self.a
    }

    pub fn domain(&self) -> &str {
        &self.d
    }

    pub fn selector(&self) -> &str {
        &self.s
    }

    /// Signature bytes (decoded `b=`).
    pub fn signature(&self) -> &[u8] {
        &self.b
    }

    /// Body hash (decoded `bh=`).
    pub fn body_hash(&self) -> &[u8] {
        &self.bh
    }

    /// Lower-cased `h=` list in signing order.
    pub fn signed_headers(&self) -> &[String] {
        &self.h
    }

    pub fn identity(&self) -> Option<&str> {
        Some(self.i.as_str()).filter(|i| !i.is_empty())
    }

    pub fn body_length(&self) -> Option<u64> {
        self.l
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.t
    }

    pub fn expiration(&self) -> Option<u64> {
        self.x
    }

    pub fn header_canonicalization(&self) -> Canonicalization {
        self.ch
    }

    pub fn body_canonicalization(&self) -> Canonicalization {
        self.cb
    }

    /// Tags that have no meaning in a DKIM signature, in header order.
    pub fn unknown_tags(&self) -> &[(String, String)] {
        &self.unknown
    }
}
