/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use crate::common::crypto::SigningKey;

use super::{Canonicalization, DkimSigner, Done, NeedDomain, NeedHeaders, NeedSelector, Signature};

impl<T: SigningKey, S> DkimSigner<T, S> {
    fn advance<N>(self) -> DkimSigner<T, N> {
        DkimSigner {
            _state: Default::default(),
            key: self.key,
            template: self.template,
            tlsrpt: self.tlsrpt,
        }
    }
}

impl<T: SigningKey> DkimSigner<T> {
    pub fn from_key(key: T) -> DkimSigner<T, NeedDomain> {
        DkimSigner {
            _state: Default::default(),
            template: Signature {
                v: 1,
                a: key.algorithm(),
                ..Default::default()
            },
            key,
            tlsrpt: false,
        }
    }
}

impl<T: SigningKey> DkimSigner<T, NeedDomain> {
    /// Signing domain (`d=`).
    pub fn domain(mut self, domain: impl Into<String>) -> DkimSigner<T, NeedSelector> {
        self.template.d = domain.into();
        self.advance()
    }
}

impl<T: SigningKey> DkimSigner<T, NeedSelector> {
    /// Key selector (`s=`), looked up under `<selector>._domainkey.<domain>`.
    pub fn selector(mut self, selector: impl Into<String>) -> DkimSigner<T, NeedHeaders> {
        self.template.s = selector.into();
        self.advance()
    }
}

impl<T: SigningKey> DkimSigner<T, NeedHeaders> {
    /// Header names to sign, in order. Names are stored lower-cased and a
    /// name may repeat to oversign.
    pub fn headers(
        mut self,
        headers: impl IntoIterator<Item = impl Into<String>>,
    ) -> DkimSigner<T, Done> {
        self.template.h = headers
            .into_iter()
            .map(|h| h.into().to_ascii_lowercase())
            .collect();
        self.advance()
    }
}

impl<T: SigningKey> DkimSigner<T, Done> {
    pub fn agent_user_identifier(mut self, auid: impl Into<String>) -> Self {
        self.template.i = auid.into();
        self
    }

    /// Emits `l=` with the canonical body length, unless signing a TLS report.
    pub fn body_length(mut self, body_length: bool) -> Self {
        self.template.l = body_length.then_some(0);
        self
    }

    /// Marks the message as a TLS report, which never carries `l=`.
    pub fn tlsrpt(mut self, tlsrpt: bool) -> Self {
        self.tlsrpt = tlsrpt;
        self
    }

    pub fn header_canonicalization(mut self, ch: Canonicalization) -> Self {
        self.template.ch = ch;
        self
    }

    pub fn body_canonicalization(mut self, cb: Canonicalization) -> Self {
        self.template.cb = cb;
        self
    }
}
