/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use num_bigint::BigUint;

use crate::{common::crypto::HashAlgorithm, Error, Result};

// DER-encoded DigestInfo prefixes, RFC 8017 section 9.2 note 1.
const SHA1_PREFIX: &[u8] = &[
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
];
const SHA256_PREFIX: &[u8] = &[
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];
const SHA512_PREFIX: &[u8] = &[
    0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03,
    0x05, 0x00, 0x04, 0x40,
];

impl HashAlgorithm {
    pub(crate) fn digest_info_prefix(&self) -> &'static [u8] {
        match self {
            HashAlgorithm::Sha1 => SHA1_PREFIX,
            HashAlgorithm::Sha256 => SHA256_PREFIX,
            HashAlgorithm::Sha512 => SHA512_PREFIX,
        }
    }
}

/// Builds the EMSA-PKCS1-v1_5 encoded message `00 01 FF.. 00 DigestInfo`
/// of exactly `len` bytes.
pub fn encode(digest: &[u8], hash: HashAlgorithm, len: usize) -> Result<Vec<u8>> {
    if digest.len() != hash.output_len() {
        return Err(Error::InvalidDigest);
    }
    let prefix = hash.digest_info_prefix();
    let t_len = prefix.len() + digest.len();
    if len < t_len + 11 {
        return Err(Error::CryptoError(
            "intended encoded message length too short".to_string(),
        ));
    }

    let mut em = Vec::with_capacity(len);
    em.extend_from_slice(&[0x00, 0x01]);
    em.resize(len - t_len - 1, 0xff);
    em.push(0x00);
    em.extend_from_slice(prefix);
    em.extend_from_slice(digest);
    Ok(em)
}

/// The encoded message as a big-endian integer.
pub fn padded_integer(digest: &[u8], hash: HashAlgorithm, len: usize) -> Result<BigUint> {
    encode(digest, hash, len).map(|em| BigUint::from_bytes_be(&em))
}
