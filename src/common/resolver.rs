/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::{borrow::Cow, collections::HashMap, future::Future, time::Duration};

use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
    system_conf::read_system_conf,
    AsyncResolver, TokioAsyncResolver,
};

use crate::Error;

use super::lru::{DnsCache, LruCache};

/// Source of DKIM key records.
///
/// `Ok(None)` means the name has no TXT record. A lookup that did not finish
/// within `timeout` must fail with [`Error::DnsTimeout`] instead.
pub trait KeyResolver: Send + Sync {
    fn resolve_txt<'x>(
        &'x self,
        name: &'x str,
        timeout: Duration,
    ) -> impl Future<Output = crate::Result<Option<Vec<u8>>>> + Send + 'x;
}

/// TXT resolver backed by trust-dns with a TTL-aware LRU cache.
pub struct DnsResolver {
    pub(crate) resolver: TokioAsyncResolver,
    pub(crate) cache_txt: LruCache<String, Vec<u8>>,
}

/// In-memory key records, keyed by query name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticResolver {
    records: HashMap<String, Vec<u8>>,
}

impl DnsResolver {
    pub fn new_cloudflare_tls() -> Result<Self, ResolveError> {
        Self::with_capacity(
            ResolverConfig::cloudflare_tls(),
            ResolverOpts::default(),
            128,
        )
    }

    pub fn new_cloudflare() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::cloudflare(), ResolverOpts::default(), 128)
    }

    pub fn new_google() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::google(), ResolverOpts::default(), 128)
    }

    pub fn new_quad9() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::quad9(), ResolverOpts::default(), 128)
    }

    pub fn new_system_conf() -> Result<Self, ResolveError> {
        let (config, options) = read_system_conf()?;
        Self::with_capacity(config, options, 128)
    }

    pub fn with_capacity(
        config: ResolverConfig,
        options: ResolverOpts,
        capacity: usize,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            resolver: AsyncResolver::tokio(config, options)?,
            cache_txt: LruCache::with_capacity(capacity),
        })
    }

    pub async fn txt_lookup(
        &self,
        name: &str,
        timeout: Duration,
    ) -> crate::Result<Option<Vec<u8>>> {
        let key = fqdn(name);
        if let Some(value) = self.cache_txt.get(key.as_ref()) {
            return Ok(Some(value));
        }

        let txt_lookup =
            match tokio::time::timeout(timeout, self.resolver.txt_lookup(key.as_ref())).await {
                Ok(Ok(txt_lookup)) => txt_lookup,
                Ok(Err(err)) if matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                    return Ok(None);
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => {
                    tracing::warn!(name = %key, ?timeout, "DNS query timed out");
                    return Err(Error::DnsTimeout);
                }
            };

        let mut records = txt_lookup.as_lookup().record_iter().filter_map(|r| {
            let txt_data = r.data()?.as_txt()?.txt_data();
            match txt_data.len() {
                0 => None,
                1 => Some(txt_data[0].to_vec()),
                _ => {
                    let mut entry = Vec::with_capacity(255 * txt_data.len());
                    for data in txt_data {
                        entry.extend_from_slice(data);
                    }
                    Some(entry)
                }
            }
        });

        // Prefer a record that carries a key over unrelated TXT data.
        let mut first = None;
        let record = loop {
            match records.next() {
                Some(record) if is_key_record(&record) => break Some(record),
                Some(record) => {
                    first.get_or_insert(record);
                }
                None => break first,
            }
        };

        Ok(record.map(|record| {
            self.cache_txt
                .insert(key.into_owned(), record, txt_lookup.valid_until())
        }))
    }
}

impl KeyResolver for DnsResolver {
    fn resolve_txt<'x>(
        &'x self,
        name: &'x str,
        timeout: Duration,
    ) -> impl Future<Output = crate::Result<Option<Vec<u8>>>> + Send + 'x {
        self.txt_lookup(name, timeout)
    }
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, name: impl AsRef<str>, record: impl Into<Vec<u8>>) -> Self {
        self.insert(name, record);
        self
    }

    pub fn insert(&mut self, name: impl AsRef<str>, record: impl Into<Vec<u8>>) {
        self.records.insert(normalize(name.as_ref()), record.into());
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.records.get(&normalize(name)).map(|r| r.as_slice())
    }
}

impl KeyResolver for StaticResolver {
    fn resolve_txt<'x>(
        &'x self,
        name: &'x str,
        _timeout: Duration,
    ) -> impl Future<Output = crate::Result<Option<Vec<u8>>>> + Send + 'x {
        let record = self.get(name).map(|r| r.to_vec());
        async move { Ok(record) }
    }
}

impl<F> KeyResolver for F
where
    F: Fn(&str) -> crate::Result<Option<Vec<u8>>> + Send + Sync,
{
    fn resolve_txt<'x>(
        &'x self,
        name: &'x str,
        _timeout: Duration,
    ) -> impl Future<Output = crate::Result<Option<Vec<u8>>>> + Send + 'x {
        let result = self(name);
        async move { result }
    }
}

impl From<ResolveError> for Error {
    fn from(err: ResolveError) -> Self {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => Error::DnsRecordNotFound,
            ResolveErrorKind::Timeout => Error::DnsTimeout,
            _ => Error::DnsError(err.to_string()),
        }
    }
}

fn fqdn(name: &str) -> Cow<'_, str> {
    if name.ends_with('.') {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}."))
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

fn is_key_record(record: &[u8]) -> bool {
    record.windows(2).any(|w| w.eq_ignore_ascii_case(b"p="))
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::Error;

    use super::{KeyResolver, StaticResolver};

    #[tokio::test]
    async fn static_resolver() {
        let resolver = StaticResolver::new()
            .with_record("Sel._domainkey.Example.com", "v=DKIM1; p=")
            .with_record("other._domainkey.example.org.", "v=DKIM1; k=ed25519; p=");

        for (name, expected) in [
            ("sel._domainkey.example.com.", Some(&b"v=DKIM1; p="[..])),
            ("SEL._domainkey.example.COM", Some(&b"v=DKIM1; p="[..])),
            (
                "other._domainkey.example.org",
                Some(&b"v=DKIM1; k=ed25519; p="[..]),
            ),
            ("missing._domainkey.example.com.", None),
        ] {
            assert_eq!(
                resolver
                    .resolve_txt(name, Duration::from_secs(1))
                    .await
                    .unwrap()
                    .as_deref(),
                expected
            );
        }
    }

    #[tokio::test]
    async fn closure_resolver() {
        let resolver = |name: &str| -> crate::Result<Option<Vec<u8>>> {
            if name.starts_with("slow.") {
                Err(Error::DnsTimeout)
            } else {
                Ok(Some(name.as_bytes().to_vec()))
            }
        };

        assert_eq!(
            resolver
                .resolve_txt("fast._domainkey.example.com.", Duration::from_secs(1))
                .await,
            Ok(Some(b"fast._domainkey.example.com.".to_vec()))
        );
        assert_eq!(
            resolver
                .resolve_txt("slow._domainkey.example.com.", Duration::from_secs(1))
                .await,
            Err(Error::DnsTimeout)
        );
    }
}
