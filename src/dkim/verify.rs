/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use crate::{
    common::{
        crypto::VerifyingKeyType,
        parse::TxtRecordParser,
        resolver::KeyResolver,
        verify::{DomainKey, Flag, VerifySignature},
    },
    AuthenticatedMessage, DkimOutput, DkimResult, Dsp, Error, MessageAuthenticator,
    SignedEvidence,
};

use super::{
    canonicalize::{body_hash, signed_data},
    headers::HEADER_NAME,
    Signature, TlsRpt, VerifyConfig,
};

impl<R: KeyResolver> MessageAuthenticator<R> {
    pub fn new(resolver: R) -> Self {
        Self::with_config(resolver, VerifyConfig::default())
    }

    pub fn with_config(resolver: R, config: VerifyConfig) -> Self {
        MessageAuthenticator { resolver, config }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Verifies every `DKIM-Signature` header of a message, topmost first.
    pub async fn verify_dkim(&self, message: &AuthenticatedMessage<'_>) -> Vec<DkimOutput> {
        let count = message.headers_named(HEADER_NAME).count();
        let mut output = Vec::with_capacity(count);
        for idx in 0..count {
            output.push(self.verify_dkim_at(message, idx).await);
        }
        output
    }

    /// Verifies the `idx`-th `DKIM-Signature` header, counting from the top.
    ///
    /// A parse or validation failure only affects this instance. The signed
    /// data is returned whenever the signature could be parsed, even if the
    /// key lookup or the cryptographic check failed.
    pub async fn verify_dkim_at(&self, message: &AuthenticatedMessage<'_>, idx: usize) -> DkimOutput {
        let (name, value) = match message.headers_named(HEADER_NAME).nth(idx) {
            Some(header) => header,
            None => return DkimOutput::none(),
        };

        let signature = match Signature::parse(value) {
            Ok(signature) => signature,
            Err(err) => {
                tracing::debug!(idx, error = %err, "Invalid DKIM-Signature header");
                return DkimOutput::perm_err(err);
            }
        };

        // l= is never honoured for TLS reports
        let length = signature.l.filter(|_| self.config.tlsrpt == TlsRpt::Off);
        let body_hash_mismatch = body_hash(
            message.body(),
            signature.cb,
            length,
            signature.a.hash_algorithm(),
        )
        .as_ref()
            != signature.bh.as_slice();
        if body_hash_mismatch {
            tracing::debug!(
                domain = %signature.d,
                selector = %signature.s,
                "DKIM body hash mismatch"
            );
        }

        let signed_data = signed_data(message, &signature.h, signature.ch, (name, value));
        let result = self.verify_signature(&signature, &signed_data).await;

        tracing::debug!(
            domain = %signature.d,
            selector = %signature.s,
            %result,
            "DKIM signature checked"
        );

        DkimOutput {
            result,
            signature: Some(signature),
            signed_data,
            body_hash_mismatch,
        }
    }

    async fn verify_signature(&self, signature: &Signature, signed_data: &[u8]) -> DkimResult {
        let record = match self.lookup_key(signature).await {
            Ok(record) => record,
            Err(result) => return result,
        };

        match self.config.tlsrpt {
            TlsRpt::Strict if !record.is_tlsrpt_only() => {
                return DkimResult::PermError(Error::Validation(
                    "s",
                    "message is a TLS report but key service type is not tlsrpt",
                ));
            }
            TlsRpt::Off if record.is_tlsrpt_only() => {
                return DkimResult::PermError(Error::Validation(
                    "s",
                    "message is not a TLS report but key service type is tlsrpt",
                ));
            }
            _ => (),
        }

        check_key(&record, signature, signed_data, self.config.min_key_bits)
    }

    /// Fetches and parses the key record of a signature, mapping every
    /// failure to its final result.
    pub(crate) async fn lookup_key(
        &self,
        signature: &impl VerifySignature,
    ) -> std::result::Result<DomainKey, DkimResult> {
        let record = match self
            .resolver
            .resolve_txt(&signature.domain_key(), self.config.timeout)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => return Err(DkimResult::Neutral(Error::DnsRecordNotFound)),
            Err(err) => return Err(DkimOutput::dns_error(err).result),
        };

        DomainKey::parse(&record).map_err(DkimResult::PermError)
    }
}

/// Applies the key size policy and verifies the signature.
pub(crate) fn check_key(
    record: &DomainKey,
    signature: &impl VerifySignature,
    signed_data: &[u8],
    min_key_bits: usize,
) -> DkimResult {
    if let (Some(VerifyingKeyType::Rsa), Some(bits)) = (record.key_type(), record.key_bits()) {
        if bits < min_key_bits {
            return DkimResult::Fail(Error::InsufficientKeySize(bits));
        }
    }

    match signature.verify(record, signed_data) {
        Ok(()) => DkimResult::Pass,
        Err(err) if record.has_flag(Flag::Testing) => DkimResult::Neutral(err),
        Err(err) => DkimResult::Fail(err),
    }
}

impl DkimOutput {
    pub(crate) fn none() -> Self {
        DkimOutput {
            result: DkimResult::None,
            signature: None,
            signed_data: Vec::new(),
            body_hash_mismatch: false,
        }
    }

    pub(crate) fn perm_err(err: Error) -> Self {
        DkimOutput {
            result: DkimResult::PermError(err),
            ..Self::none()
        }
    }

    pub(crate) fn dns_error(err: Error) -> Self {
        DkimOutput {
            result: match err {
                Error::DnsRecordNotFound => DkimResult::Neutral(err),
                Error::DnsTimeout | Error::DnsError(_) => DkimResult::TempError(err),
                _ => DkimResult::PermError(err),
            },
            ..Self::none()
        }
    }

    pub fn result(&self) -> &DkimResult {
        &self.result
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// The exact bytes that were hashed for the header signature.
    pub fn signed_data(&self) -> &[u8] {
        &self.signed_data
    }

    /// Set when the body did not hash to `bh=`. This does not change
    /// [`DkimOutput::result`].
    pub fn body_hash_mismatch(&self) -> bool {
        self.body_hash_mismatch
    }

    pub fn dsp(&self) -> Option<Dsp> {
        self.signature.as_ref().map(|s| s.dsp())
    }

    /// Evidence for key recovery, available whenever the signature parsed,
    /// regardless of the verification outcome.
    pub fn evidence(&self, source: impl Into<String>) -> Option<(Dsp, SignedEvidence)> {
        let signature = self.signature.as_ref()?;
        if self.signed_data.is_empty() {
            return None;
        }
        let mut evidence =
            SignedEvidence::new(self.signed_data.clone(), signature.b.clone(), source);
        if let Some(t) = signature.t {
            evidence = evidence.with_timestamp(t);
        }
        Some((signature.dsp(), evidence))
    }
}
