//! Mail-exchange resolution.
//!
//! The production resolver looks up MX records with hickory and returns
//! them ordered by preference; a domain without MX records is treated as
//! its own (only) exchange per RFC 5321 section 5.1. Results are cached
//! with the record TTL, clamped between configurable bounds, in a
//! lock-free `DashMap`.
//!
//! The delivery core consumes resolution through the [`MxResolver`]
//! trait and never re-sorts the candidate list it is given.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use hickory_resolver::{
    TokioResolver, config::ResolverOpts, name_server::TokioConnectionProvider,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// The port candidates are dialed on.
const SMTP_PORT: u16 = 25;

/// Errors from mail-exchange resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The DNS query failed or timed out.
    #[error("MX lookup failed: {0}")]
    Lookup(#[from] hickory_resolver::ResolveError),
}

/// A candidate mail exchange for a destination domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailExchange {
    /// Host name (or address literal) of the exchange.
    pub host: String,
    /// MX preference; lower is tried first. Zero for implicit
    /// candidates.
    pub priority: u16,
    /// TCP port, normally 25.
    pub port: u16,
}

impl MailExchange {
    #[must_use]
    pub const fn new(host: String, priority: u16, port: u16) -> Self {
        Self {
            host,
            priority,
            port,
        }
    }

    /// The dial target as `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Produces the ordered candidate exchanges for a destination domain.
///
/// The returned order is the order in which candidates are tried; the
/// delivery core never re-sorts it.
#[async_trait]
pub trait MxResolver: Send + Sync {
    async fn resolve(&self, domain: &str) -> Result<Vec<MailExchange>, ResolveError>;
}

/// Configuration for the DNS-backed resolver.
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    /// DNS query timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cache TTL override in seconds. When unset the record's own TTL is
    /// used, clamped by the bounds below.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,

    /// Lower bound applied to record TTLs before caching.
    #[serde(default = "default_min_cache_ttl_secs")]
    pub min_cache_ttl_secs: u64,

    /// Upper bound applied to record TTLs before caching.
    #[serde(default = "default_max_cache_ttl_secs")]
    pub max_cache_ttl_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    5
}

const fn default_min_cache_ttl_secs() -> u64 {
    60 // 1 minute
}

const fn default_max_cache_ttl_secs() -> u64 {
    3600 // 1 hour
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: None,
            min_cache_ttl_secs: default_min_cache_ttl_secs(),
            max_cache_ttl_secs: default_max_cache_ttl_secs(),
        }
    }
}

/// A cached candidate list with its expiry.
#[derive(Debug, Clone)]
struct CachedExchanges {
    exchanges: Vec<MailExchange>,
    expires_at: Instant,
}

/// DNS-backed resolver with a TTL-bounded cache.
#[derive(Debug)]
pub struct DnsResolver {
    resolver: TokioResolver,
    cache: DashMap<String, CachedExchanges>,
    config: DnsConfig,
}

impl DnsResolver {
    /// Create a resolver from the system DNS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system configuration cannot be loaded.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_config(DnsConfig::default())
    }

    /// Create a resolver with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolver cannot be initialized.
    pub fn with_config(config: DnsConfig) -> Result<Self, ResolveError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())?
            .with_options(opts)
            .build();

        Ok(Self {
            resolver,
            cache: DashMap::new(),
            config,
        })
    }

    async fn lookup(&self, domain: &str) -> Result<(Vec<MailExchange>, u32), ResolveError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let ttl = lookup
                    .as_lookup()
                    .records()
                    .iter()
                    .map(hickory_resolver::proto::rr::Record::ttl)
                    .min()
                    .unwrap_or(300);

                let mut exchanges: Vec<MailExchange> = lookup
                    .iter()
                    .map(|mx| {
                        let host = mx.exchange().to_utf8();
                        MailExchange::new(
                            host.trim_end_matches('.').to_string(),
                            mx.preference(),
                            SMTP_PORT,
                        )
                    })
                    .collect();

                if exchanges.is_empty() {
                    return Ok((Self::implicit(domain), ttl));
                }

                exchanges.sort_by_key(|mx| mx.priority);
                debug!(
                    "resolved {} exchange(s) for {domain} with TTL {ttl}s",
                    exchanges.len()
                );
                Ok((exchanges, ttl))
            }
            Err(err) if err.is_no_records_found() => {
                debug!("no MX records for {domain}, using the domain as implicit exchange");
                Ok((Self::implicit(domain), 300))
            }
            Err(err) => {
                warn!("MX lookup failed for {domain}: {err}");
                Err(ResolveError::Lookup(err))
            }
        }
    }

    /// RFC 5321 section 5.1: without MX records the domain itself is the
    /// only candidate.
    fn implicit(domain: &str) -> Vec<MailExchange> {
        vec![MailExchange::new(domain.to_string(), 0, SMTP_PORT)]
    }
}

#[async_trait]
impl MxResolver for DnsResolver {
    async fn resolve(&self, domain: &str) -> Result<Vec<MailExchange>, ResolveError> {
        if let Some(cached) = self.cache.get(domain) {
            if cached.expires_at > Instant::now() {
                debug!(
                    "cache hit for {domain}, {} exchange(s)",
                    cached.exchanges.len()
                );
                return Ok(cached.exchanges.clone());
            }
            debug!("cache entry expired for {domain}");
        }

        let (exchanges, record_ttl) = self.lookup(domain).await?;

        let cache_ttl = self.config.cache_ttl_secs.unwrap_or_else(|| {
            u64::from(record_ttl).clamp(
                self.config.min_cache_ttl_secs,
                self.config.max_cache_ttl_secs,
            )
        });

        self.cache.insert(
            domain.to_string(),
            CachedExchanges {
                exchanges: exchanges.clone(),
                expires_at: Instant::now() + Duration::from_secs(cache_ttl),
            },
        );

        Ok(exchanges)
    }
}
