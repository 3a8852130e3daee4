/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::time::SystemTime;

use crate::{
    common::{
        crypto::{Algorithm, Sha256, SigningKey},
        parse::strip_signature,
    },
    dkim::{
        canonicalize::{body_hash, select_headers, signed_data},
        Canonicalization, Done,
    },
    ArcOutput, AuthenticatedMessage, AuthenticationResults, DkimResult, Error,
};

use super::{
    headers::{AAR_HEADER, AMS_HEADER, AS_HEADER},
    ArcSealer, ArcSet, ChainValidation, Set, MAX_INSTANCE,
};

impl<T: SigningKey<Hasher = Sha256>> ArcSealer<T, Done> {
    /// Seals a message on top of the chain described by `arc_output`.
    pub fn seal<'x>(
        &self,
        message: &AuthenticatedMessage<'_>,
        results: &'x AuthenticationResults<'x>,
        arc_output: &ArcOutput<'_>,
    ) -> crate::Result<ArcSet<'x>> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.seal_stamped(message, results, arc_output, now)
    }

    /// Seals a message using `now` as the timestamp of both signatures.
    ///
    /// The new set takes the next instance number after the highest one in
    /// `arc_output`, starting at 1.
    pub fn seal_stamped<'x>(
        &self,
        message: &AuthenticatedMessage<'_>,
        results: &'x AuthenticationResults<'x>,
        arc_output: &ArcOutput<'_>,
        now: u64,
    ) -> crate::Result<ArcSet<'x>> {
        if !arc_output.can_be_sealed() {
            return Err(Error::ArcInvalidCV);
        }
        if self.key.algorithm() != Algorithm::RsaSha256 {
            return Err(Error::Validation("a", "unknown signature algorithm"));
        }
        if self.signature.d.is_empty() || self.signature.s.is_empty() || self.signature.h.is_empty()
        {
            return Err(Error::MissingParameters);
        }
        if select_headers(
            message.headers(),
            self.signature.h.iter().map(|h| h.as_str()),
        )
        .is_empty()
        {
            return Err(Error::NoHeadersFound);
        }

        let i = arc_output.set.last().map_or(1, |set| set.seal.header.i + 1);
        if i > MAX_INSTANCE {
            return Err(Error::ArcChainTooLong);
        }

        let mut set = ArcSet {
            signature: self.signature.clone(),
            seal: self.seal.clone(),
            results,
        };
        set.signature.i = i;
        set.seal.i = i;
        set.seal.cv = match (i, &arc_output.result) {
            (1, _) => ChainValidation::None,
            (_, DkimResult::Pass) => ChainValidation::Pass,
            _ => ChainValidation::Fail,
        };

        // Message signature
        let signature = &mut set.signature;
        let cb = signature.cb;
        if signature.l.is_some() {
            signature.l = Some(cb.canonical_body(message.body(), None).canonical_len());
        }
        signature.bh = body_hash(message.body(), cb, signature.l, signature.a.hash_algorithm())
            .as_ref()
            .to_vec();
        signature.t = Some(now);
        signature.b = Vec::new();
        let data = signed_data(
            message,
            &signature.h,
            signature.ch,
            (AMS_HEADER.as_bytes(), signature.header_value().as_slice()),
        );
        signature.b = self.key.sign(data.as_slice())?;

        // Seal over the whole chain
        set.seal.t = Some(now);
        set.seal.b = Vec::new();
        let mut aar = results.arc_header_value(i);
        aar.extend_from_slice(b"\r\n");
        let mut ams = set.signature.header_value();
        ams.extend_from_slice(b"\r\n");
        let seal = set.seal.header_value();

        let mut chain = arc_output
            .set
            .iter()
            .flat_map(|set| set.chain_headers())
            .collect::<Vec<_>>();
        chain.push((AAR_HEADER.as_bytes(), aar.as_slice()));
        chain.push((AMS_HEADER.as_bytes(), ams.as_slice()));
        let data = seal_data(chain, (AS_HEADER.as_bytes(), seal.as_slice()));
        set.seal.b = self.key.sign(data.as_slice())?;

        Ok(set)
    }
}

impl<'x> Set<'x> {
    /// The raw headers of this instance in the order they are sealed.
    pub(crate) fn chain_headers(&self) -> [(&'x [u8], &'x [u8]); 3] {
        [
            (self.results.name, self.results.value),
            (self.signature.name, self.signature.value),
            (self.seal.name, self.seal.value),
        ]
    }
}

/// Relaxed canonical form of `chain` followed by `seal` with its `b=` value
/// removed, without the final line break.
pub(crate) fn seal_data<'a>(
    chain: impl IntoIterator<Item = (&'a [u8], &'a [u8])>,
    seal: (&[u8], &[u8]),
) -> Vec<u8> {
    let mut data = Vec::with_capacity(1024);
    Canonicalization::Relaxed.canonicalize_headers(chain.into_iter(), &mut data);

    let unsigned = strip_signature(seal.1);
    Canonicalization::Relaxed
        .canonicalize_headers([(seal.0, unsigned.as_slice())].into_iter(), &mut data);
    let end = data
        .iter()
        .rposition(|ch| !ch.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    data.truncate(end);

    data
}
