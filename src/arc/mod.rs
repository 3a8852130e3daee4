/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! Authenticated Received Chain (RFC 8617).

pub mod builder;
pub mod headers;
pub mod parse;
pub mod seal;
pub mod verify;

use crate::{
    common::{
        crypto::{Algorithm, Sha256, SigningKey},
        headers::Header,
        verify::VerifySignature,
    },
    dkim::{Canonicalization, NeedDomain},
    ArcOutput, AuthenticationResults, DkimResult, Dsp, SignedEvidence,
};

/// Chains longer than this are rejected outright.
pub const MAX_INSTANCE: u32 = 50;

/// Builds a new ARC set on top of an existing chain.
pub struct ArcSealer<T: SigningKey<Hasher = Sha256>, State = NeedDomain> {
    _state: std::marker::PhantomData<State>,
    pub(crate) key: T,
    pub(crate) signature: Signature,
    pub(crate) seal: Seal,
}

/// An `ARC-Message-Signature` header.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Signature {
    pub(crate) i: u32,
    pub(crate) a: Algorithm,
    pub(crate) d: String,
    pub(crate) s: String,
    pub(crate) b: Vec<u8>,
    pub(crate) bh: Vec<u8>,
    pub(crate) h: Vec<String>,
    pub(crate) l: Option<u64>,
    pub(crate) x: Option<u64>,
    pub(crate) t: Option<u64>,
    pub(crate) ch: Canonicalization,
    pub(crate) cb: Canonicalization,
    pub(crate) unknown: Vec<(String, String)>,
}

/// An `ARC-Seal` header.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Seal {
    pub(crate) i: u32,
    pub(crate) a: Algorithm,
    pub(crate) b: Vec<u8>,
    pub(crate) d: String,
    pub(crate) s: String,
    pub(crate) t: Option<u64>,
    pub(crate) cv: ChainValidation,
    pub(crate) unknown: Vec<(String, String)>,
}

/// An `ARC-Authentication-Results` header. Only the instance is parsed.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Results {
    pub(crate) i: u32,
}

/// A freshly sealed set, ready to be prepended to the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcSet<'x> {
    pub(crate) signature: Signature,
    pub(crate) seal: Seal,
    pub(crate) results: &'x AuthenticationResults<'x>,
}

/// One instance of an existing chain, with the raw headers it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Set<'x> {
    pub(crate) signature: Header<'x, Signature>,
    pub(crate) seal: Header<'x, Seal>,
    pub(crate) results: Header<'x, Results>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ChainValidation {
    #[default]
    None,
    Fail,
    Pass,
}

impl ChainValidation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainValidation::None => "none",
            ChainValidation::Fail => "fail",
            ChainValidation::Pass => "pass",
        }
    }
}

impl VerifySignature for Signature {
    fn signature(&self) -> &[u8] {
        &self.b
    }

    fn algorithm(&self) -> Algorithm {
        self.a
    }

    fn selector(&self) -> &str {
        &self.s
    }

    fn domain(&self) -> &str {
        &self.d
    }
}

impl VerifySignature for Seal {
    fn signature(&self) -> &[u8] {
        &self.b
    }

    fn algorithm(&self) -> Algorithm {
        self.a
    }

    fn selector(&self) -> &str {
        &self.s
    }

    fn domain(&self) -> &str {
        &self.d
    }
}

impl Signature {
    pub fn instance(&self) -> u32 {
        self.i
    }

    pub fn domain(&self) -> &str {
        &self.d
    }

    pub fn selector(&self) -> &str {
        &self.s
    }

    pub fn signed_headers(&self) -> &[String] {
        &self.h
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.t
    }
}

impl Seal {
    pub fn instance(&self) -> u32 {
        self.i
    }

    pub fn domain(&self) -> &str {
        &self.d
    }

    pub fn selector(&self) -> &str {
        &self.s
    }

    pub fn chain_validation(&self) -> ChainValidation {
        self.cv
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.t
    }
}

impl<'x> Set<'x> {
    pub fn instance(&self) -> u32 {
        self.seal.header.i
    }

    pub fn signature(&self) -> &Signature {
        &self.signature.header
    }

    pub fn seal(&self) -> &Seal {
        &self.seal.header
    }
}

impl<'x> ArcOutput<'x> {
    pub(crate) fn with_result(mut self, result: DkimResult) -> Self {
        self.result = result;
        self
    }

    pub fn result(&self) -> &DkimResult {
        &self.result
    }

    /// The chain in ascending instance order.
    pub fn sets(&self) -> &[Set<'x>] {
        &self.set
    }

    /// Set when the body did not hash to the newest `ARC-Message-Signature`.
    pub fn body_hash_mismatch(&self) -> bool {
        self.body_hash_mismatch
    }

    /// Evidence for every signature in the chain whose signed data was
    /// computed: the newest message signature first, then the seals from
    /// the highest instance down.
    pub fn evidence(&self, source: &str) -> Vec<(Dsp, SignedEvidence)> {
        self.signed
            .iter()
            .map(|(dsp, evidence)| {
                let mut evidence = evidence.clone();
                evidence.source = source.to_string();
                (dsp.clone(), evidence)
            })
            .collect()
    }

    pub fn can_be_sealed(&self) -> bool {
        self.set
            .last()
            .map_or(true, |set| set.seal.header.cv != ChainValidation::Fail)
    }
}

impl<'x> Default for ArcOutput<'x> {
    fn default() -> Self {
        Self {
            result: DkimResult::None,
            set: Vec::new(),
            body_hash_mismatch: false,
            signed: Vec::new(),
        }
    }
}
