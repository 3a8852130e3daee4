/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::fmt::{Display, Write};

use crate::{ArcOutput, AuthenticationResults, DkimOutput, DkimResult, Error};

use super::parse::encode_base64;

impl<'x> AuthenticationResults<'x> {
    pub fn new(hostname: &'x str) -> Self {
        AuthenticationResults {
            hostname,
            auth_results: String::with_capacity(64),
        }
    }

    pub fn with_dkim_results(mut self, dkim: &[DkimOutput]) -> Self {
        for dkim in dkim {
            self.set_dkim_result(dkim);
        }
        self
    }

    pub fn with_dkim_result(mut self, dkim: &DkimOutput) -> Self {
        self.set_dkim_result(dkim);
        self
    }

    pub fn set_dkim_result(&mut self, dkim: &DkimOutput) {
        self.auth_results.push_str(";\r\n\tdkim=");
        dkim.result.as_auth_result(&mut self.auth_results);
        if let Some(signature) = &dkim.signature {
            if !signature.i.is_empty() {
                self.auth_results.push_str(" header.i=");
                self.auth_results.push_str(&signature.i);
            } else {
                self.auth_results.push_str(" header.d=");
                self.auth_results.push_str(&signature.d);
            }
            self.auth_results.push_str(" header.s=");
            self.auth_results.push_str(&signature.s);
            if signature.b.len() >= 6 {
                self.auth_results.push_str(" header.b=");
                self.auth_results.push_str(&String::from_utf8_lossy(
                    &encode_base64(&signature.b[..6]).unwrap_or_default(),
                ));
            }
        }
    }

    pub fn with_arc_result(mut self, arc: &ArcOutput) -> Self {
        self.auth_results.push_str(";\r\n\tarc=");
        arc.result.as_auth_result(&mut self.auth_results);
        self
    }
}

impl Display for AuthenticationResults<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.hostname)?;
        f.write_str(&self.auth_results)
    }
}

pub trait AsAuthResult {
    fn as_auth_result(&self, header: &mut String);
}

impl AsAuthResult for DkimResult {
    fn as_auth_result(&self, header: &mut String) {
        match &self {
            DkimResult::Pass => header.push_str("pass"),
            DkimResult::Neutral(err) => {
                header.push_str("neutral");
                err.as_auth_result(header);
            }
            DkimResult::Fail(err) => {
                header.push_str("fail");
                err.as_auth_result(header);
            }
            DkimResult::PermError(err) => {
                header.push_str("permerror");
                err.as_auth_result(header);
            }
            DkimResult::TempError(err) => {
                header.push_str("temperror");
                err.as_auth_result(header);
            }
            DkimResult::None => header.push_str("none"),
        }
    }
}

impl AsAuthResult for Error {
    fn as_auth_result(&self, header: &mut String) {
        header.push_str(" (");
        header.push_str(match self {
            Error::MissingParameters => "missing parameters",
            Error::NoHeadersFound => "no headers found",
            Error::MessageFormat(_) => "malformed message",
            Error::InvalidTagValueList => "invalid tag-value list",
            Error::Validation(tag, _) => {
                write!(header, "invalid {tag}= tag)").ok();
                return;
            }
            Error::KeyFormat(_) => "dns record parse error",
            Error::UnknownKeyType => "unsupported key type",
            Error::CryptoError(_) => "verification failed",
            Error::Io(_) => "i/o error",
            Error::Base64 => "base64 error",
            Error::FailedVerification => "verification failed",
            Error::RevokedPublicKey => "revoked public key",
            Error::IncompatibleAlgorithms => "incompatible record/signature algorithms",
            Error::InsufficientKeySize(bits) => {
                write!(header, "{bits}-bit key too small)").ok();
                return;
            }
            Error::DnsTimeout => "dns timeout",
            Error::DnsError(_) => "dns error",
            Error::DnsRecordNotFound => "dns record not found",
            Error::ArcInvalidInstance(i) => {
                write!(header, "invalid ARC instance {i})").ok();
                return;
            }
            Error::ArcInvalidCV => "invalid ARC cv",
            Error::ArcChainTooLong => "too many ARC headers",
            Error::ArcHasHeaderTag => "ARC has header tag",
            Error::ArcBrokenChain => "broken ARC chain",
            Error::SignatureLengthMismatch | Error::DuplicateSignature | Error::InvalidDigest => {
                "invalid evidence"
            }
        });
        header.push(')');
    }
}
