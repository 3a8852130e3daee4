/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! RSA public modulus recovery from pairs of signatures.
//!
//! For a PKCS#1 v1.5 signature `s` over the encoded message `m`, `s^e - m`
//! is a multiple of the modulus `n`. Two signatures made with the same key
//! therefore share `n` as a common factor, and the GCD of both differences
//! is `n` times a (usually small) cofactor.

use std::fmt::Display;

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::One;
use rsa::{pkcs8::EncodePublicKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::{
    common::{
        crypto::HashAlgorithm,
        parse::{decode_base64, encode_base64},
    },
    Error, Result, SignedEvidence,
};

pub mod collect;
pub mod pkcs1;
pub mod primes;
pub mod solver;

pub use collect::{EvidenceCollector, WorkItem};
pub use solver::{Solver, SolverConfig, SolverRow};

// Largest modulus accepted when rendering a recovered key.
const MAX_RENDERED_BITS: usize = 16384;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryConfig {
    pub(crate) exponents: Vec<u32>,
    pub(crate) max_gcd_bits: u64,
    pub(crate) small_prime_bound: u32,
    pub(crate) hash: HashAlgorithm,
}

/// A public key reconstructed from signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredKey {
    pub(crate) modulus: BigUint,
    pub(crate) exponent: u32,
}

/// The `{"n_hex": .., "e_hex": ..}` document printed by `find-modulus`.
/// Both fields are `"0x0"` when no modulus was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulusReport {
    pub n_hex: String,
    pub e_hex: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            exponents: vec![65537, 3, 17],
            max_gcd_bits: 10000,
            small_prime_bound: 1500,
            hash: HashAlgorithm::Sha256,
        }
    }
}

impl RecoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidate public exponents, tried in order.
    pub fn with_exponents(mut self, exponents: impl IntoIterator<Item = u32>) -> Self {
        self.exponents = exponents.into_iter().collect();
        self
    }

    /// GCDs longer than this are treated as noise.
    pub fn with_max_gcd_bits(mut self, bits: u64) -> Self {
        self.max_gcd_bits = bits;
        self
    }

    /// Primes below this bound are divided out of the GCD.
    pub fn with_small_prime_bound(mut self, bound: u32) -> Self {
        self.small_prime_bound = bound;
        self
    }

    pub fn with_hash(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    pub fn exponents(&self) -> &[u32] {
        &self.exponents
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }
}

/// Attempts to recover the modulus shared by two pieces of evidence.
///
/// Both signed data buffers are hashed with the configured algorithm.
/// `Ok(None)` means no exponent produced a common factor, which is the
/// expected outcome for signatures made with different keys.
pub fn find_modulus(
    evidence_a: &SignedEvidence,
    evidence_b: &SignedEvidence,
    config: &RecoveryConfig,
) -> Result<Option<RecoveredKey>> {
    let digest_a = config.hash.hash(evidence_a.signed_data());
    let digest_b = config.hash.hash(evidence_b.signed_data());
    recover_modulus(
        (digest_a.as_ref(), evidence_a.signature()),
        (digest_b.as_ref(), evidence_b.signature()),
        config,
    )
}

/// Same as [`find_modulus`] but over precomputed `(digest, signature)` pairs.
pub fn recover_modulus(
    (digest_a, signature_a): (&[u8], &[u8]),
    (digest_b, signature_b): (&[u8], &[u8]),
    config: &RecoveryConfig,
) -> Result<Option<RecoveredKey>> {
    if signature_a.len() != signature_b.len() {
        return Err(Error::SignatureLengthMismatch);
    } else if signature_a == signature_b {
        return Err(Error::DuplicateSignature);
    }

    let len = signature_a.len();
    let message_a = pkcs1::padded_integer(digest_a, config.hash, len)?;
    let message_b = pkcs1::padded_integer(digest_b, config.hash, len)?;
    let signature_a = BigUint::from_bytes_be(signature_a);
    let signature_b = BigUint::from_bytes_be(signature_b);
    let primes = primes::primes_below(config.small_prime_bound);

    for &exponent in &config.exponents {
        tracing::debug!(
            context = "recover",
            exponent,
            hash = %config.hash,
            signature_bits = len * 8,
            "Trying public exponent."
        );

        let gcd = difference(&signature_a, exponent, &message_a)
            .gcd(&difference(&signature_b, exponent, &message_b));
        if gcd.bits() > config.max_gcd_bits {
            tracing::debug!(
                context = "recover",
                exponent,
                gcd_bits = gcd.bits(),
                "Discarding oversized GCD."
            );
            continue;
        }

        let modulus = primes::strip_small_factors(gcd, &primes);
        if modulus > BigUint::one() {
            tracing::info!(
                context = "recover",
                exponent,
                hash = %config.hash,
                modulus_bits = modulus.bits(),
                "Recovered public modulus."
            );
            return Ok(Some(RecoveredKey { modulus, exponent }));
        }
    }

    Ok(None)
}

/// Recovers a modulus from hex digests and base64 signatures and returns
/// the JSON-compatible report.
pub fn find_modulus_hex(
    digest_hex_a: &str,
    signature_base64_a: &str,
    digest_hex_b: &str,
    signature_base64_b: &str,
    config: &RecoveryConfig,
) -> Result<ModulusReport> {
    let digest_a = decode_hex(digest_hex_a)?;
    let digest_b = decode_hex(digest_hex_b)?;
    let signature_a = decode_base64(signature_base64_a.trim().as_bytes())?;
    let signature_b = decode_base64(signature_base64_b.trim().as_bytes())?;

    recover_modulus(
        (digest_a.as_slice(), signature_a.as_slice()),
        (digest_b.as_slice(), signature_b.as_slice()),
        config,
    )
    .map(|key| {
        key.as_ref()
            .map(ModulusReport::from)
            .unwrap_or_else(ModulusReport::not_found)
    })
}

// |s^e - m|, the sign does not affect the GCD
fn difference(signature: &BigUint, exponent: u32, message: &BigUint) -> BigUint {
    let power = signature.pow(exponent);
    if &power >= message {
        power - message
    } else {
        message - power
    }
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    let value = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if value.is_empty() || value.len() % 2 != 0 {
        return Err(Error::InvalidDigest);
    }

    value
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or(Error::InvalidDigest)
        })
        .collect()
}

impl RecoveredKey {
    pub fn new(modulus: BigUint, exponent: u32) -> Self {
        RecoveredKey { modulus, exponent }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    pub fn bits(&self) -> u64 {
        self.modulus.bits()
    }

    /// Checks that `signature^e mod n` is the PKCS#1 encoding of `digest`.
    pub fn verifies(&self, digest: &[u8], signature: &[u8], hash: HashAlgorithm) -> bool {
        let len = ((self.modulus.bits() + 7) / 8) as usize;
        if signature.len() != len {
            return false;
        }
        let signature = BigUint::from_bytes_be(signature);
        if signature >= self.modulus {
            return false;
        }

        match pkcs1::padded_integer(digest, hash, len) {
            Ok(message) => {
                signature.modpow(&BigUint::from(self.exponent), &self.modulus) == message
            }
            Err(_) => false,
        }
    }

    /// DER-encoded SubjectPublicKeyInfo.
    pub fn to_public_key_der(&self) -> Result<Vec<u8>> {
        let key = RsaPublicKey::new_with_max_size(
            rsa::BigUint::from_bytes_be(&self.modulus.to_bytes_be()),
            rsa::BigUint::from(self.exponent),
            MAX_RENDERED_BITS,
        )?;
        key.to_public_key_der()
            .map(|der| der.as_bytes().to_vec())
            .map_err(|err| Error::KeyFormat(err.to_string()))
    }

    /// Renders the key as a DKIM key record, `k=rsa; p=<base64 DER>`.
    pub fn to_dns_record(&self) -> Result<String> {
        let der = encode_base64(&self.to_public_key_der()?)?;
        Ok(format!("k=rsa; p={}", String::from_utf8_lossy(&der)))
    }
}

impl Display for RecoveredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-bit modulus, e={}", self.modulus.bits(), self.exponent)
    }
}

impl ModulusReport {
    pub fn not_found() -> Self {
        ModulusReport {
            n_hex: "0x0".to_string(),
            e_hex: "0x0".to_string(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.n_hex != "0x0"
    }
}

impl From<&RecoveredKey> for ModulusReport {
    fn from(key: &RecoveredKey) -> Self {
        ModulusReport {
            n_hex: format!("{:#x}", key.modulus),
            e_hex: format!("{:#x}", key.exponent),
        }
    }
}

#[cfg(test)]
mod test {
    use num_bigint::BigUint;
    use rsa::{pkcs1::DecodeRsaPrivateKey, traits::PublicKeyParts, RsaPrivateKey};

    use crate::{
        common::{
            crypto::{HashAlgorithm, RsaKey, Sha256, SigningKey},
            headers::HeaderWriter,
            parse::encode_base64,
            test_keys::{
                RSA_E17_PRIVATE_KEY, RSA_E3_OTHER_PRIVATE_KEY, RSA_E3_PRIVATE_KEY,
                RSA_PRIVATE_KEY,
            },
        },
        dkim::DkimSigner,
        AuthenticatedMessage, Error, MessageAuthenticator, SignedEvidence, StaticResolver,
    };

    use super::{find_modulus, find_modulus_hex, ModulusReport, RecoveredKey, RecoveryConfig};

    pub(crate) fn evidence(private_key: &str, message: &str, source: &str) -> SignedEvidence {
        let signature = RsaKey::<Sha256>::from_pkcs1_pem(private_key)
            .unwrap()
            .sign(message.as_bytes())
            .unwrap();
        SignedEvidence::new(message.as_bytes(), signature, source)
    }

    pub(crate) fn modulus(private_key: &str) -> BigUint {
        let key = RsaPrivateKey::from_pkcs1_pem(private_key).unwrap();
        BigUint::from_bytes_be(&key.n().to_bytes_be())
    }

    pub(crate) fn fast_config() -> RecoveryConfig {
        RecoveryConfig::new().with_exponents([3, 17])
    }

    #[test]
    fn recover_small_exponents() {
        for (private_key, exponent) in [
            (RSA_E3_PRIVATE_KEY, 3),
            (RSA_E17_PRIVATE_KEY, 17),
            (RSA_E3_OTHER_PRIVATE_KEY, 3),
        ] {
            let a = evidence(private_key, "message one", "a");
            let b = evidence(private_key, "message two", "b");
            let key = find_modulus(&a, &b, &fast_config()).unwrap().unwrap();
            assert_eq!(key.modulus(), &modulus(private_key));
            assert_eq!(key.exponent(), exponent);
            assert_eq!(key.bits(), 1024);

            let digest = HashAlgorithm::Sha256.hash(&b"message one"[..]);
            assert!(key.verifies(digest.as_ref(), a.signature(), HashAlgorithm::Sha256));
            assert!(!key.verifies(digest.as_ref(), b.signature(), HashAlgorithm::Sha256));
            assert!(!key.verifies(digest.as_ref(), a.signature(), HashAlgorithm::Sha512));
        }
    }

    #[test]
    fn recover_not_found() {
        // Different keys share no factor
        let a = evidence(RSA_E3_PRIVATE_KEY, "message one", "a");
        let b = evidence(RSA_E3_OTHER_PRIVATE_KEY, "message two", "b");
        assert_eq!(find_modulus(&a, &b, &fast_config()).unwrap(), None);

        // Wrong exponent guess
        let a = evidence(RSA_E17_PRIVATE_KEY, "message one", "a");
        let b = evidence(RSA_E17_PRIVATE_KEY, "message two", "b");
        assert_eq!(
            find_modulus(&a, &b, &RecoveryConfig::new().with_exponents([3])).unwrap(),
            None
        );

        // Wrong hash guess
        assert_eq!(
            find_modulus(&a, &b, &fast_config().with_hash(HashAlgorithm::Sha512)).unwrap(),
            None
        );

        // A GCD above the size limit is noise
        assert_eq!(
            find_modulus(&a, &b, &fast_config().with_max_gcd_bits(512)).unwrap(),
            None
        );
    }

    #[test]
    fn recover_rejects_degenerate_pairs() {
        let a = evidence(RSA_E3_PRIVATE_KEY, "message one", "a");
        let b = evidence(RSA_PRIVATE_KEY, "message two", "b");
        let truncated = SignedEvidence::new(
            b.signed_data().to_vec(),
            &a.signature()[1..],
            "truncated",
        );

        for (a, b, expected) in [
            (&a, &truncated, Error::SignatureLengthMismatch),
            (&a, &a, Error::DuplicateSignature),
        ] {
            assert_eq!(find_modulus(a, b, &fast_config()).unwrap_err(), expected);
        }
    }

    #[test]
    fn recover_hex_interface() {
        let a = evidence(RSA_E3_PRIVATE_KEY, "message one", "a");
        let b = evidence(RSA_E3_PRIVATE_KEY, "message two", "b");
        let hex = |data: &[u8]| {
            HashAlgorithm::Sha256
                .hash(data)
                .as_ref()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>()
        };
        let base64 = |data: &[u8]| String::from_utf8(encode_base64(data).unwrap()).unwrap();

        let report = find_modulus_hex(
            &hex(a.signed_data()),
            &base64(a.signature()),
            &format!("0x{}", hex(b.signed_data()).to_uppercase()),
            &base64(b.signature()),
            &fast_config(),
        )
        .unwrap();
        assert!(report.is_found());
        assert_eq!(report.e_hex, "0x3");
        assert_eq!(
            report.n_hex,
            format!("{:#x}", modulus(RSA_E3_PRIVATE_KEY))
        );
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            format!("{{\"n_hex\":\"{}\",\"e_hex\":\"0x3\"}}", report.n_hex)
        );

        let other = evidence(RSA_E3_OTHER_PRIVATE_KEY, "message two", "b");
        let report = find_modulus_hex(
            &hex(a.signed_data()),
            &base64(a.signature()),
            &hex(other.signed_data()),
            &base64(other.signature()),
            &fast_config(),
        )
        .unwrap();
        assert_eq!(report, ModulusReport::not_found());
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            "{\"n_hex\":\"0x0\",\"e_hex\":\"0x0\"}"
        );

        for digest in ["", "abc", "zz", "0x"] {
            assert_eq!(
                find_modulus_hex(
                    digest,
                    &base64(a.signature()),
                    &hex(b.signed_data()),
                    &base64(b.signature()),
                    &fast_config(),
                )
                .unwrap_err(),
                Error::InvalidDigest,
                "{digest:?}"
            );
        }
    }

    #[test]
    fn recovered_key_rendering() {
        let key = RecoveredKey::new(modulus(RSA_E3_PRIVATE_KEY), 3);
        let record = key.to_dns_record().unwrap();
        assert!(record.starts_with("k=rsa; p=MIGdMA0GCSqGSIb3DQEBAQUAA4GLADCBhwKBgQDErh2lth/fGT7Z"));
        assert_eq!(key.to_string(), "1024-bit modulus, e=3");

        // The rendered record verifies the original signature
        let public_key = crate::common::crypto::VerifyingKeyType::Rsa
            .verifying_key(&key.to_public_key_der().unwrap())
            .unwrap();
        let a = evidence(RSA_E3_PRIVATE_KEY, "message one", "a");
        assert_eq!(
            public_key.verify(
                a.signed_data(),
                a.signature(),
                crate::common::crypto::Algorithm::RsaSha256
            ),
            Ok(())
        );
    }

    #[tokio::test]
    async fn recover_from_dkim_evidence() {
        // Two messages signed with an unpublished key
        let signer = DkimSigner::from_key(RsaKey::<Sha256>::from_pkcs1_pem(RSA_E3_PRIVATE_KEY).unwrap())
            .domain("Example.COM")
            .selector("hidden")
            .headers(["From", "To", "Subject"]);
        let authenticator = MessageAuthenticator::new(StaticResolver::new());

        let mut collected = Vec::new();
        for (num, subject) in ["First", "Second"].into_iter().enumerate() {
            let message = format!(
                concat!(
                    "From: alice@example.com\r\n",
                    "To: bob@example.net\r\n",
                    "Subject: {}\r\n",
                    "\r\n",
                    "Hello.\r\n"
                ),
                subject
            );
            let signature = signer.sign_stamped(message.as_bytes(), 1_700_000_000).unwrap();
            let mut raw = signature.to_header().into_bytes();
            raw.extend_from_slice(message.as_bytes());

            let message = AuthenticatedMessage::parse(&raw).unwrap();
            let output = authenticator.verify_dkim_at(&message, 0).await;
            collected.push(output.evidence(&format!("mbox:{num}")).unwrap());
        }

        assert_eq!(collected[0].0, collected[1].0);
        assert_eq!(collected[0].0.to_string(), "hidden._domainkey.example.com");
        let key = find_modulus(&collected[0].1, &collected[1].1, &fast_config())
            .unwrap()
            .unwrap();
        assert_eq!(key.modulus(), &modulus(RSA_E3_PRIVATE_KEY));
        assert_eq!(key.exponent(), 3);
    }

    #[cfg(feature = "slow-tests")]
    #[test]
    fn recover_default_exponent() {
        let a = evidence(RSA_PRIVATE_KEY, "message one", "a");
        let b = evidence(RSA_PRIVATE_KEY, "message two", "b");
        let key = find_modulus(&a, &b, &RecoveryConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(key.modulus(), &modulus(RSA_PRIVATE_KEY));
        assert_eq!(key.exponent(), 65537);
    }

    #[cfg(feature = "slow-tests")]
    #[test]
    fn recover_default_exponents_not_found() {
        // Every default exponent is tried, including 65537, before giving up
        assert_eq!(RecoveryConfig::default().exponents(), [65537, 3, 17]);
        let a = evidence(RSA_E3_PRIVATE_KEY, "message one", "a");
        let b = evidence(RSA_E3_OTHER_PRIVATE_KEY, "message two", "b");
        assert_eq!(
            find_modulus(&a, &b, &RecoveryConfig::default()).unwrap(),
            None
        );
    }
}
