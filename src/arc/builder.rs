/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use crate::{
    common::crypto::{Sha256, SigningKey},
    dkim::{Canonicalization, Done, NeedDomain, NeedHeaders, NeedSelector},
};

use super::{ArcSealer, Seal, Signature};

impl<T: SigningKey<Hasher = Sha256>, S> ArcSealer<T, S> {
    fn advance<N>(self) -> ArcSealer<T, N> {
        ArcSealer {
            _state: Default::default(),
            key: self.key,
            signature: self.signature,
            seal: self.seal,
        }
    }
}

impl<T: SigningKey<Hasher = Sha256>> ArcSealer<T> {
    pub fn from_key(key: T) -> ArcSealer<T, NeedDomain> {
        ArcSealer {
            _state: Default::default(),
            signature: Signature {
                a: key.algorithm(),
                ..Default::default()
            },
            seal: Seal {
                a: key.algorithm(),
                ..Default::default()
            },
            key,
        }
    }
}

impl<T: SigningKey<Hasher = Sha256>> ArcSealer<T, NeedDomain> {
    /// Sealing domain, shared by the message signature and the seal.
    pub fn domain(mut self, domain: impl Into<String>) -> ArcSealer<T, NeedSelector> {
        self.signature.d = domain.into();
        self.seal.d.clone_from(&self.signature.d);
        self.advance()
    }
}

impl<T: SigningKey<Hasher = Sha256>> ArcSealer<T, NeedSelector> {
    pub fn selector(mut self, selector: impl Into<String>) -> ArcSealer<T, NeedHeaders> {
        self.signature.s = selector.into();
        self.seal.s.clone_from(&self.signature.s);
        self.advance()
    }
}

impl<T: SigningKey<Hasher = Sha256>> ArcSealer<T, NeedHeaders> {
    /// Headers covered by `ARC-Message-Signature`. The seal itself always
    /// covers the chain headers only.
    pub fn headers(
        mut self,
        headers: impl IntoIterator<Item = impl Into<String>>,
    ) -> ArcSealer<T, Done> {
        self.signature.h = headers
            .into_iter()
            .map(|h| h.into().to_ascii_lowercase())
            .collect();
        self.advance()
    }
}

impl<T: SigningKey<Hasher = Sha256>> ArcSealer<T, Done> {
    /// Emits `l=` on the message signature.
    pub fn body_length(mut self, body_length: bool) -> Self {
        self.signature.l = body_length.then_some(0);
        self
    }

    pub fn header_canonicalization(mut self, ch: Canonicalization) -> Self {
        self.signature.ch = ch;
        self
    }

    pub fn body_canonicalization(mut self, cb: Canonicalization) -> Self {
        self.signature.cb = cb;
        self
    }
}
