use crate::cache::ResolutionCache;
use crate::limiter::RateLimiter;
use crate::model::ResolutionOutcome;
use crate::{Error, Result};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

// region:        --- Network lookup

/// Name to address lookup, one attempt, no retry.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup_ip(&self, name: &str) -> Result<Vec<IpAddr>>;
}

pub struct SystemLookup {
    resolver: TokioAsyncResolver,
}

impl SystemLookup {
    /// Use the host resolver configuration, or the library defaults when it
    /// cannot be read.
    pub fn new(lookup_timeout: Duration) -> Self {
        let (config, mut opts) = match read_system_conf() {
            Ok(conf) => conf,
            Err(err) => {
                warn!("{:12} - {}, using default upstreams", "SYSTEM CONF", err);
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = lookup_timeout;
        // retries are driven by `Resolver`
        opts.attempts = 1;
        debug!("DNS resolver options: {:?}", opts);

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl Lookup for SystemLookup {
    async fn lookup_ip(&self, name: &str) -> Result<Vec<IpAddr>> {
        let lookup = self.resolver.lookup_ip(name).await?;
        Ok(lookup.iter().collect())
    }
}

// endregion:     --- Network lookup

// region:        --- Resolver

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Bound on a single attempt.
    pub timeout: Duration,
    /// Attempts after the first one.
    pub retry: usize,
    pub retry_wait: Duration,
}

impl RetryPolicy {
    pub fn attempts(&self) -> usize {
        self.retry + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeSource {
    Cache,
    Network,
    /// Gave up because the scan was cancelled, nothing was cached.
    Cancelled,
}

pub struct Resolver {
    lookup: Arc<dyn Lookup>,
    cache: Arc<ResolutionCache>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl Resolver {
    pub fn new(
        lookup: Arc<dyn Lookup>,
        cache: Arc<ResolutionCache>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            lookup,
            cache,
            limiter,
            policy,
        }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Cached outcome if any, otherwise up to `retry + 1` rate limited
    /// attempts. Lookup errors end up in `Unresolved`, never in an `Err`.
    pub async fn resolve(
        &self,
        candidate: &str,
        cancel: &CancellationToken,
    ) -> (ResolutionOutcome, OutcomeSource) {
        if let Some(outcome) = self.cache.get(candidate).await {
            trace!("{:12} - {}", "CACHE HIT", candidate);
            return (outcome, OutcomeSource::Cache);
        }

        let attempts = self.policy.attempts();
        let mut reason = None;

        for attempt in 1..=attempts {
            let Some(permit) = self.limiter.acquire(cancel).await else {
                return cancelled();
            };
            let res = self.attempt(candidate).await;
            drop(permit);

            match res {
                Ok(ips) if !ips.is_empty() => {
                    debug!("{:12} - {} {:?}", "RESOLVED", candidate, ips);
                    let ips = ips.iter().map(IpAddr::to_string).collect();
                    let outcome = self
                        .cache
                        .put(candidate.to_string(), ResolutionOutcome::Resolved(ips))
                        .await;
                    return (outcome, OutcomeSource::Network);
                }
                Ok(_) => reason = Some("no addresses".to_string()),
                Err(err) => reason = Some(err.to_string()),
            }
            trace!("{} attempt {}/{}: {:?}", candidate, attempt, attempts, reason);

            if attempt < attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return cancelled(),
                    _ = sleep(self.policy.retry_wait) => {}
                }
            }
        }

        debug!("{:12} - {} ({:?})", "NOT RESOLVED", candidate, reason);
        let outcome = self
            .cache
            .put(
                candidate.to_string(),
                ResolutionOutcome::Unresolved { reason },
            )
            .await;
        (outcome, OutcomeSource::Network)
    }

    async fn attempt(&self, candidate: &str) -> Result<Vec<IpAddr>> {
        match timeout(self.policy.timeout, self.lookup.lookup_ip(candidate)).await {
            Ok(res) => res,
            Err(elapsed) => Err(Error::Timeout(elapsed)),
        }
    }
}

fn cancelled() -> (ResolutionOutcome, OutcomeSource) {
    let outcome = ResolutionOutcome::Unresolved {
        reason: Some("cancelled".to_string()),
    };
    (outcome, OutcomeSource::Cancelled)
}

// endregion:     --- Resolver
