/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::time::SystemTime;

use super::{
    canonicalize::{body_hash, select_headers, signed_data},
    headers::HEADER_NAME,
    DkimSigner, Done, Signature,
};
use crate::{common::crypto::SigningKey, AuthenticatedMessage, Error};

impl<T: SigningKey> DkimSigner<T, Done> {
    /// Signs a message.
    pub fn sign(&self, message: &[u8]) -> crate::Result<Signature> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.sign_stamped(message, now)
    }

    /// Signs a message using `now` as the signature timestamp.
    pub fn sign_stamped(&self, message: &[u8], now: u64) -> crate::Result<Signature> {
        let message = AuthenticatedMessage::parse(message)?;
        if self.template.d.is_empty() || self.template.s.is_empty() || self.template.h.is_empty() {
            return Err(Error::MissingParameters);
        }
        if select_headers(
            message.headers(),
            self.template.h.iter().map(|h| h.as_str()),
        )
        .is_empty()
        {
            return Err(Error::NoHeadersFound);
        }

        let mut signature = self.template.clone();
        signature.l = match signature.l {
            Some(_) if !self.tlsrpt => Some(
                signature
                    .cb
                    .canonical_body(message.body(), None)
                    .canonical_len(),
            ),
            _ => None,
        };
        signature.bh = body_hash(
            message.body(),
            signature.cb,
            signature.l,
            signature.a.hash_algorithm(),
        )
        .as_ref()
        .to_vec();
        signature.t = Some(now);
        signature.b = Vec::new();

        let data = signed_data(
            &message,
            &signature.h,
            signature.ch,
            (HEADER_NAME.as_bytes(), signature.header_value().as_slice()),
        );
        signature.b = self.key.sign(data.as_slice())?;

        Ok(signature)
    }
}

#[cfg(test)]
mod test {
    use mail_builder::encoders::base64::base64_encode;
    use mail_parser::decoders::base64::base64_decode;

    use crate::{
        common::{
            crypto::{Ed25519Key, RsaKey, Sha256},
            headers::HeaderWriter,
            test_keys::{
                key_record, ED25519_PRIVATE_KEY, ED25519_PUBLIC_KEY, RSA_PRIVATE_KEY,
                RSA_PUBLIC_KEY,
            },
        },
        dkim::{Canonicalization, DkimSigner, Signature},
        AuthenticatedMessage, DkimResult, Error, MessageAuthenticator, StaticResolver,
    };

    const MESSAGE: &str = concat!(
        "From: bill@example.com\r\n",
        "To: jdoe@example.com\r\n",
        "Subject: TPS Report\r\n",
        "\r\n",
        "I'm going to need those TPS reports ASAP. ",
        "So, if you could do that, that'd be great.\r\n"
    );

    #[test]
    fn dkim_sign() {
        let pk = RsaKey::<Sha256>::from_pkcs1_pem(RSA_PRIVATE_KEY).unwrap();
        let signature = DkimSigner::from_key(pk)
            .domain("stalw.art")
            .selector("default")
            .headers(["From", "To", "Subject"])
            .header_canonicalization(Canonicalization::Relaxed)
            .body_canonicalization(Canonicalization::Relaxed)
            .sign_stamped(
                concat!(
                    "From: hello@stalw.art\r\n",
                    "To: dkim@stalw.art\r\n",
                    "Subject: Testing  DKIM!\r\n\r\n",
                    "Here goes the test\r\n\r\n"
                )
                .as_bytes(),
                311923920,
            )
            .unwrap();

        assert_eq!(
            String::from_utf8(base64_encode(signature.body_hash()).unwrap()).unwrap(),
            "QoiUNYyUV+1tZ/xUPRcE+gST2zAStvJx1OK078Ylm5s="
        );
        assert_eq!(signature.signature().len(), 128);
        assert_eq!(signature.timestamp(), Some(311923920));
        assert_eq!(signature.signed_headers(), ["from", "to", "subject"]);

        // The serialized header parses back to the same signature
        let header = signature.to_header();
        assert!(header.starts_with(
            "DKIM-Signature: v=1; a=rsa-sha256; c=relaxed/relaxed; d=stalw.art; s=default;\r\n"
        ));
        assert!(header.split("\r\n").all(|line| line.len() <= 78));
        let (_, value) = header.split_once(':').unwrap();
        assert_eq!(Signature::parse(value.as_bytes()).unwrap(), signature);
    }

    #[test]
    fn dkim_sign_errors() {
        let pk = RsaKey::<Sha256>::from_pkcs1_pem(RSA_PRIVATE_KEY).unwrap();
        assert_eq!(
            DkimSigner::from_key(pk)
                .domain("example.com")
                .selector("default")
                .headers(["X-Missing"])
                .sign(MESSAGE.as_bytes())
                .unwrap_err(),
            Error::NoHeadersFound
        );

        let pk = RsaKey::<Sha256>::from_pkcs1_pem(RSA_PRIVATE_KEY).unwrap();
        assert_eq!(
            DkimSigner::from_key(pk)
                .domain("")
                .selector("default")
                .headers(["From"])
                .sign(MESSAGE.as_bytes())
                .unwrap_err(),
            Error::MissingParameters
        );
    }

    #[tokio::test]
    async fn dkim_sign_verify() {
        let message_multiheader = concat!(
            "X-Duplicate-Header: 4\r\n",
            "From: bill@example.com\r\n",
            "X-Duplicate-Header: 3\r\n",
            "To: jdoe@example.com\r\n",
            "X-Duplicate-Header: 2\r\n",
            "Subject: TPS Report\r\n",
            "X-Duplicate-Header: 1\r\n",
            "To: jane@example.com\r\n",
            "\r\n",
            "I'm going to need those TPS reports ASAP. ",
            "So, if you could do that, that'd be great.\r\n"
        );

        let authenticator = MessageAuthenticator::new(
            StaticResolver::new()
                .with_record(
                    "default._domainkey.example.com",
                    key_record("rsa", RSA_PUBLIC_KEY, ""),
                )
                .with_record(
                    "ed._domainkey.example.com",
                    key_record("ed25519", ED25519_PUBLIC_KEY, ""),
                ),
        );

        // Every canonicalization pair, both key types
        for ch in [Canonicalization::Simple, Canonicalization::Relaxed] {
            for cb in [Canonicalization::Simple, Canonicalization::Relaxed] {
                let pk_rsa = RsaKey::<Sha256>::from_pkcs1_pem(RSA_PRIVATE_KEY).unwrap();
                let signature = DkimSigner::from_key(pk_rsa)
                    .domain("example.com")
                    .selector("default")
                    .headers(["From", "To", "Subject"])
                    .agent_user_identifier("jdoe@example.com")
                    .header_canonicalization(ch)
                    .body_canonicalization(cb)
                    .sign(MESSAGE.as_bytes())
                    .unwrap();
                verify(&authenticator, &signature, MESSAGE, DkimResult::Pass).await;

                let pk_ed = Ed25519Key::from_bytes(
                    &base64_decode(ED25519_PRIVATE_KEY.as_bytes()).unwrap(),
                )
                .unwrap();
                let signature = DkimSigner::from_key(pk_ed)
                    .domain("example.com")
                    .selector("ed")
                    .headers(["From", "To", "Subject"])
                    .header_canonicalization(ch)
                    .body_canonicalization(cb)
                    .sign(MESSAGE.as_bytes())
                    .unwrap();
                verify(&authenticator, &signature, MESSAGE, DkimResult::Pass).await;
            }
        }

        // Duplicated and missing headers
        let pk_rsa = RsaKey::<Sha256>::from_pkcs1_pem(RSA_PRIVATE_KEY).unwrap();
        let signature = DkimSigner::from_key(pk_rsa)
            .domain("example.com")
            .selector("default")
            .headers([
                "From",
                "To",
                "Subject",
                "X-Duplicate-Header",
                "X-Duplicate-Header",
                "X-Does-Not-Exist",
            ])
            .sign(message_multiheader.as_bytes())
            .unwrap();
        verify(
            &authenticator,
            &signature,
            message_multiheader,
            DkimResult::Pass,
        )
        .await;

        // Body length allows appended content
        let pk_rsa = RsaKey::<Sha256>::from_pkcs1_pem(RSA_PRIVATE_KEY).unwrap();
        let signature = DkimSigner::from_key(pk_rsa)
            .domain("example.com")
            .selector("default")
            .headers(["From", "To", "Subject"])
            .header_canonicalization(Canonicalization::Relaxed)
            .body_length(true)
            .sign(MESSAGE.as_bytes())
            .unwrap();
        assert_eq!(signature.body_length(), Some(86));
        let body_hash_mismatch = verify(
            &authenticator,
            &signature,
            &format!("{MESSAGE}\r\n----- Mailing list"),
            DkimResult::Pass,
        )
        .await;
        assert!(!body_hash_mismatch);

        // Unsigned extra From header
        let pk_rsa = RsaKey::<Sha256>::from_pkcs1_pem(RSA_PRIVATE_KEY).unwrap();
        let signature = DkimSigner::from_key(pk_rsa)
            .domain("example.com")
            .selector("default")
            .headers(["From", "To", "Subject"])
            .sign(MESSAGE.as_bytes())
            .unwrap();
        verify(
            &authenticator,
            &signature,
            &MESSAGE.replacen(
                "From: bill@example.com\r\n",
                "From: bill@example.com\r\nFrom: ceo@example.com\r\n",
                1,
            ),
            DkimResult::Fail(Error::FailedVerification),
        )
        .await;
    }

    /// Prepends `signature` to `message`, verifies it and returns the body
    /// hash mismatch flag.
    async fn verify(
        authenticator: &MessageAuthenticator<StaticResolver>,
        signature: &Signature,
        message: &str,
        expect: DkimResult,
    ) -> bool {
        let mut raw = signature.to_header().into_bytes();
        raw.extend_from_slice(message.as_bytes());

        let message = AuthenticatedMessage::parse(&raw).unwrap();
        let output = authenticator.verify_dkim_at(&message, 0).await;
        assert_eq!(output.result(), &expect, "{}", signature.to_header());
        assert_eq!(output.signature(), Some(signature));
        output.body_hash_mismatch()
    }
}
