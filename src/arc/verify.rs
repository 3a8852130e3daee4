/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use crate::{
    common::{headers::Header, resolver::KeyResolver, verify::VerifySignature},
    dkim::{
        canonicalize::{body_hash, signed_data},
        verify::check_key,
    },
    ArcOutput, AuthenticatedMessage, DkimResult, Error, MessageAuthenticator, SignedEvidence,
    TlsRpt,
};

use super::{
    headers::{AAR_HEADER, AMS_HEADER, AS_HEADER},
    seal::seal_data,
    ChainValidation, Results, Seal, Set, Signature, MAX_INSTANCE,
};

impl<R: KeyResolver> MessageAuthenticator<R> {
    /// Verifies the ARC chain of a message.
    ///
    /// The result is `None` when the message carries no ARC headers, `Pass`
    /// for an intact chain and a failure naming the first problem found
    /// otherwise. Only the newest message signature is checked, and every
    /// seal is checked from the highest instance down to 1.
    pub async fn verify_arc<'x>(&self, message: &'x AuthenticatedMessage<'x>) -> ArcOutput<'x> {
        let seals = message.headers_named(AS_HEADER).collect::<Vec<_>>();
        let signatures = message.headers_named(AMS_HEADER).collect::<Vec<_>>();
        let results = message.headers_named(AAR_HEADER).collect::<Vec<_>>();

        let output = ArcOutput::default();
        if seals.is_empty() && signatures.is_empty() && results.is_empty() {
            return output;
        } else if [seals.len(), signatures.len(), results.len()]
            .iter()
            .any(|&len| len > MAX_INSTANCE as usize)
        {
            return output.with_result(DkimResult::Fail(Error::ArcChainTooLong));
        } else if seals.len() != signatures.len() || seals.len() != results.len() {
            return output.with_result(DkimResult::Fail(Error::ArcBrokenChain));
        }

        let mut output = match parse_chain(seals, signatures, results) {
            Ok(set) => ArcOutput { set, ..output },
            Err(err) => {
                tracing::debug!(error = %err, "Invalid ARC chain");
                return output.with_result(DkimResult::Fail(err));
            }
        };

        // Declared chain status, highest instance first
        if output.set.iter().rev().any(|set| {
            set.seal.header.cv
                != if set.instance() == 1 {
                    ChainValidation::None
                } else {
                    ChainValidation::Pass
                }
        }) {
            return output.with_result(DkimResult::Fail(Error::ArcInvalidCV));
        }

        // Signed data for the newest message signature and every seal
        let mut signed = Vec::with_capacity(output.set.len() + 1);
        if let Some(set) = output.set.last() {
            let signature = &set.signature.header;
            output.body_hash_mismatch = body_hash(
                message.body(),
                signature.cb,
                signature.l.filter(|_| self.config.tlsrpt == TlsRpt::Off),
                signature.a.hash_algorithm(),
            )
            .as_ref()
                != signature.bh.as_slice();
            if output.body_hash_mismatch {
                tracing::debug!(
                    domain = %signature.d,
                    selector = %signature.s,
                    instance = signature.i,
                    "ARC body hash mismatch"
                );
            }
            signed.push((
                Target::Signature(output.set.len() - 1),
                signed_data(
                    message,
                    &signature.h,
                    signature.ch,
                    (set.signature.name, set.signature.value),
                ),
            ));
        }
        for (pos, set) in output.set.iter().enumerate().rev() {
            let chain = output.set[..pos]
                .iter()
                .flat_map(|lower| lower.chain_headers())
                .chain([
                    (set.results.name, set.results.value),
                    (set.signature.name, set.signature.value),
                ]);
            signed.push((
                Target::Seal(pos),
                seal_data(chain, (set.seal.name, set.seal.value)),
            ));
        }
        output.signed = signed
            .iter()
            .map(|(target, data)| {
                let (dsp, b, t) = match target {
                    Target::Signature(pos) => {
                        let s = &output.set[*pos].signature.header;
                        (s.dsp(), &s.b, s.t)
                    }
                    Target::Seal(pos) => {
                        let s = &output.set[*pos].seal.header;
                        (s.dsp(), &s.b, s.t)
                    }
                };
                let mut evidence = SignedEvidence::new(data.clone(), b.clone(), "");
                evidence.timestamp = t;
                (dsp, evidence)
            })
            .collect();

        for (target, data) in &signed {
            let result = match target {
                Target::Signature(pos) => {
                    self.verify_chain_member(&output.set[*pos].signature.header, data)
                        .await
                }
                Target::Seal(pos) => {
                    self.verify_chain_member(&output.set[*pos].seal.header, data)
                        .await
                }
            };
            if result != DkimResult::Pass {
                tracing::debug!(?target, %result, "ARC chain broken");
                return output.with_result(result);
            }
        }

        tracing::debug!(instances = output.set.len(), "ARC chain verified");
        output.with_result(DkimResult::Pass)
    }

    /// Checks one signature of the chain. Anything short of a pass, except
    /// for a transient DNS failure, breaks the chain.
    async fn verify_chain_member(
        &self,
        signature: &impl VerifySignature,
        signed_data: &[u8],
    ) -> DkimResult {
        let result = match self.lookup_key(signature).await {
            Ok(record) => check_key(&record, signature, signed_data, self.config.min_key_bits),
            Err(result) => result,
        };
        match result {
            DkimResult::Pass | DkimResult::TempError(_) => result,
            DkimResult::Neutral(err)
            | DkimResult::Fail(err)
            | DkimResult::PermError(err) => DkimResult::Fail(err),
            DkimResult::None => DkimResult::Fail(Error::ArcBrokenChain),
        }
    }
}

#[derive(Debug)]
enum Target {
    Signature(usize),
    Seal(usize),
}

type RawHeader<'x> = (&'x [u8], &'x [u8]);

/// Parses every ARC header and groups them by instance, which must run from
/// 1 to the number of sets without gaps.
fn parse_chain<'x>(
    seals: Vec<RawHeader<'x>>,
    signatures: Vec<RawHeader<'x>>,
    results: Vec<RawHeader<'x>>,
) -> crate::Result<Vec<Set<'x>>> {
    let mut seals = seals
        .into_iter()
        .map(|(name, value)| Seal::parse(value).map(|seal| Header::new(name, value, seal)))
        .collect::<crate::Result<Vec<_>>>()?;
    let mut signatures = signatures
        .into_iter()
        .map(|(name, value)| {
            Signature::parse(value).map(|signature| Header::new(name, value, signature))
        })
        .collect::<crate::Result<Vec<_>>>()?;
    let mut results = results
        .into_iter()
        .map(|(name, value)| Results::parse(value).map(|results| Header::new(name, value, results)))
        .collect::<crate::Result<Vec<_>>>()?;

    seals.sort_by_key(|h| h.header.i);
    signatures.sort_by_key(|h| h.header.i);
    results.sort_by_key(|h| h.header.i);

    let mut chain = Vec::with_capacity(seals.len());
    for (pos, ((seal, signature), results)) in seals
        .into_iter()
        .zip(signatures)
        .zip(results)
        .enumerate()
    {
        let i = pos as u32 + 1;
        if seal.header.i != i || signature.header.i != i || results.header.i != i {
            return Err(Error::ArcInvalidInstance(i));
        }
        chain.push(Set {
            signature,
            seal,
            results,
        });
    }

    Ok(chain)
}
