/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! DKIM and ARC verification engine paired with an RSA common-modulus
//! recovery engine.
//!
//! The verification side parses RFC 5322 messages, canonicalizes the signed
//! headers and body and checks `DKIM-Signature` and `ARC-*` headers against
//! keys obtained through a [`KeyResolver`]. Every verified (or attempted)
//! signature yields the exact bytes that were hashed, which is what the
//! recovery side needs: two signatures made with the same unpublished key are
//! enough to reconstruct its public modulus.

use std::{borrow::Cow, fmt::Display, ops::Range};

use arc::Set;

pub mod arc;
pub mod common;
pub mod dkim;
pub mod recover;

pub use common::resolver::{DnsResolver, KeyResolver, StaticResolver};
pub use dkim::{TlsRpt, VerifyConfig};
pub use recover::{
    find_modulus, EvidenceCollector, ModulusReport, RecoveredKey, RecoveryConfig, Solver,
    SolverConfig, SolverRow,
};

/// A parsed RFC 5322 message.
///
/// Headers are kept as raw `(name, value)` byte ranges in their original
/// order. Bare `\n` line endings are rewritten to `\r\n` before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedMessage<'x> {
    pub(crate) raw: Cow<'x, [u8]>,
    pub(crate) headers: Vec<(Range<usize>, Range<usize>)>,
    pub(crate) body_offset: usize,
}

/// Verifies DKIM signatures and ARC chains using an injected key resolver.
#[derive(Debug, Clone)]
pub struct MessageAuthenticator<R> {
    pub(crate) resolver: R,
    pub(crate) config: VerifyConfig,
}

/// Authentication-Results header contents, used when sealing ARC sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResults<'x> {
    pub(crate) hostname: &'x str,
    pub(crate) auth_results: String,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DkimResult {
    Pass,
    Fail(crate::Error),
    PermError(crate::Error),
    TempError(crate::Error),
    Neutral(crate::Error),
    None,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DkimOutput {
    pub(crate) result: DkimResult,
    pub(crate) signature: Option<dkim::Signature>,
    pub(crate) signed_data: Vec<u8>,
    pub(crate) body_hash_mismatch: bool,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ArcOutput<'x> {
    pub(crate) result: DkimResult,
    pub(crate) set: Vec<Set<'x>>,
    pub(crate) body_hash_mismatch: bool,
    pub(crate) signed: Vec<(Dsp, SignedEvidence)>,
}

/// Domain and selector pair naming a DKIM key record.
///
/// Both fields are lower-cased on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dsp {
    pub(crate) domain: String,
    pub(crate) selector: String,
}

/// The bytes hashed for one signature together with the signature itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEvidence {
    pub(crate) signed_data: Vec<u8>,
    pub(crate) signature: Vec<u8>,
    pub(crate) source: String,
    pub(crate) timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    MissingParameters,
    NoHeadersFound,
    MessageFormat(String),
    InvalidTagValueList,
    Validation(&'static str, &'static str),
    KeyFormat(String),
    UnknownKeyType,
    CryptoError(String),
    Io(String),
    Base64,
    FailedVerification,
    RevokedPublicKey,
    IncompatibleAlgorithms,
    InsufficientKeySize(usize),

    DnsTimeout,
    DnsError(String),
    DnsRecordNotFound,

    ArcChainTooLong,
    ArcInvalidInstance(u32),
    ArcInvalidCV,
    ArcHasHeaderTag,
    ArcBrokenChain,

    SignatureLengthMismatch,
    DuplicateSignature,
    InvalidDigest,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MissingParameters => write!(f, "Missing parameters"),
            Error::NoHeadersFound => write!(f, "No headers found"),
            Error::MessageFormat(err) => write!(f, "Malformed message: {err}"),
            Error::InvalidTagValueList => write!(f, "Invalid tag-value list."),
            Error::Validation(tag, reason) => write!(f, "Invalid '{tag}=' tag: {reason}."),
            Error::KeyFormat(err) => write!(f, "Invalid public key: {err}"),
            Error::UnknownKeyType => write!(f, "Unsupported key type in DKIM DNS record."),
            Error::CryptoError(err) => write!(f, "Cryptography layer error: {err}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Base64 => write!(f, "Base64 encode or decode error."),
            Error::FailedVerification => write!(f, "Signature verification failed."),
            Error::RevokedPublicKey => write!(f, "Public key for this signature has been revoked."),
            Error::IncompatibleAlgorithms => write!(
                f,
                "Incompatible algorithms used in signature and DKIM DNS record."
            ),
            Error::InsufficientKeySize(bits) => {
                write!(f, "Public key too small: {bits} bits.")
            }
            Error::DnsTimeout => write!(f, "DNS query timed out."),
            Error::DnsError(err) => write!(f, "DNS resolution error: {err}"),
            Error::DnsRecordNotFound => write!(f, "DNS record not found."),
            Error::ArcChainTooLong => write!(f, "Too many ARC headers."),
            Error::ArcInvalidInstance(i) => {
                write!(f, "Invalid 'i={i}' value found in ARC header.")
            }
            Error::ArcInvalidCV => write!(f, "Invalid 'cv=' value found in ARC header."),
            Error::ArcHasHeaderTag => write!(f, "Invalid 'h=' tag present in ARC-Seal."),
            Error::ArcBrokenChain => write!(f, "Broken or missing ARC chain."),
            Error::SignatureLengthMismatch => write!(f, "Signature lengths differ."),
            Error::DuplicateSignature => write!(f, "Signatures are identical."),
            Error::InvalidDigest => write!(f, "Invalid hexadecimal digest."),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<rsa::errors::Error> for Error {
    fn from(err: rsa::errors::Error) -> Self {
        Error::CryptoError(err.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        Error::CryptoError(err.to_string())
    }
}

impl Display for DkimResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DkimResult::Pass => f.write_str("pass"),
            DkimResult::Fail(err) => write!(f, "fail ({err})"),
            DkimResult::PermError(err) => write!(f, "permerror ({err})"),
            DkimResult::TempError(err) => write!(f, "temperror ({err})"),
            DkimResult::Neutral(err) => write!(f, "neutral ({err})"),
            DkimResult::None => f.write_str("none"),
        }
    }
}

impl Dsp {
    pub fn new(domain: impl AsRef<str>, selector: impl AsRef<str>) -> Self {
        Dsp {
            domain: domain.as_ref().to_ascii_lowercase(),
            selector: selector.as_ref().to_ascii_lowercase(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }
}

impl Display for Dsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}._domainkey.{}", self.selector, self.domain)
    }
}

impl SignedEvidence {
    pub fn new(
        signed_data: impl Into<Vec<u8>>,
        signature: impl Into<Vec<u8>>,
        source: impl Into<String>,
    ) -> Self {
        SignedEvidence {
            signed_data: signed_data.into(),
            signature: signature.into(),
            source: source.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn signed_data(&self) -> &[u8] {
        &self.signed_data
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }
}

#[cfg(test)]
mod test {
    use super::Dsp;

    #[test]
    fn dsp_is_case_folded() {
        let dsp = Dsp::new("Example.COM", "Selector1");
        assert_eq!(dsp, Dsp::new("example.com", "selector1"));
        assert_eq!(dsp.domain(), "example.com");
        assert_eq!(dsp.selector(), "selector1");
        assert_eq!(dsp.to_string(), "selector1._domainkey.example.com");
    }
}
