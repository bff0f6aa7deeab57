use crate::cache::ResolutionCache;
use crate::config::ScanConfig;
use crate::dns::{Lookup, OutcomeSource, Resolver, RetryPolicy, SystemLookup};
use crate::enrich::{Enricher, Fetch, HttpFetcher};
use crate::limiter::RateLimiter;
use crate::model::{ResolutionOutcome, ScanReport, ScanStats, Subdomain};
use crate::wordlist::chunk;
use crate::Result;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// found subdomains waiting for the collector
const RESULT_QUEUE_CAPACITY: usize = 256;

// region:        --- Scanner

/// One scan run. Owns the cache, the rate limiter and the worker cap, all
/// shared with the workers by `Arc`.
pub struct Scanner {
    resolver: Arc<Resolver>,
    enricher: Option<Arc<Enricher>>,
    threads: usize,
    batch_size: usize,
    cancel: CancellationToken,
}

impl Scanner {
    pub fn new(
        config: &ScanConfig,
        lookup: Arc<dyn Lookup>,
        fetcher: Option<Arc<dyn Fetch>>,
    ) -> Self {
        let policy = RetryPolicy {
            timeout: config.timeout,
            retry: config.retry,
            retry_wait: config.retry_wait,
        };
        let resolver = Resolver::new(
            lookup,
            Arc::new(ResolutionCache::new()),
            Arc::new(RateLimiter::new(config.rate_limit)),
            policy,
        );
        let enricher = fetcher
            .and_then(|fetcher| Enricher::new(fetcher, config.status_code, config.title))
            .map(Arc::new);

        Self {
            resolver: Arc::new(resolver),
            enricher,
            threads: config.threads.max(1),
            batch_size: config.batch_size.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Scanner backed by the host resolver, with an HTTP client only when
    /// status code or title is asked for.
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let lookup: Arc<dyn Lookup> = Arc::new(SystemLookup::new(config.timeout));
        let fetcher: Option<Arc<dyn Fetch>> = if config.wants_enrichment() {
            Some(Arc::new(HttpFetcher::new(config.http_timeout)?))
        } else {
            None
        };
        Ok(Self::new(config, lookup, fetcher))
    }

    /// Cancelling this token stops workers from taking new candidates.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[instrument(name = "scan", level = "info", skip_all, fields(candidates = candidates.len()))]
    pub async fn scan(&self, candidates: Vec<String>) -> ScanReport {
        let mut report = ScanReport::new(OffsetDateTime::now_utc());
        let started = Instant::now();

        let batches = chunk(&candidates, self.batch_size);
        info!(
            "{:12} - {} batches, {} workers max, {} DNS permits",
            "DISPATCH",
            batches.len(),
            self.threads,
            self.resolver.limiter().capacity()
        );

        let slots = Arc::new(Semaphore::new(self.threads));
        let (found_tx, found_rx) = mpsc::channel(RESULT_QUEUE_CAPACITY);
        let collector = tokio::spawn(collect(found_rx));

        let mut workers = JoinSet::new();
        for (id, batch) in batches.into_iter().enumerate() {
            let worker = Worker {
                id,
                resolver: self.resolver.clone(),
                enricher: self.enricher.clone(),
                found_tx: found_tx.clone(),
                cancel: self.cancel.clone(),
            };
            let slots = slots.clone();
            workers.spawn(async move {
                let Ok(_slot) = slots.acquire_owned().await else {
                    return WorkerStats {
                        skipped: batch.len(),
                        ..Default::default()
                    };
                };
                worker.run(batch).await
            });
        }
        // the collector stops once every worker dropped its sender
        drop(found_tx);

        let mut stats = ScanStats {
            candidates: candidates.len(),
            ..Default::default()
        };
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_stats) => worker_stats.add_to(&mut stats),
                Err(err) => error!("{:12} - {}", "WORKER", err),
            }
        }

        report.subdomains = match collector.await {
            Ok(subdomains) => subdomains,
            Err(err) => {
                error!("{:12} - {}", "COLLECTOR", err);
                Vec::new()
            }
        };
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        report.stats = stats;
        report.cancelled = self.cancel.is_cancelled();

        info!(
            "{:12} - {} found, {} resolved, {} unresolved, {} cache hits, {} skipped, {} cached",
            "DONE",
            report.subdomains.len(),
            report.stats.resolved,
            report.stats.unresolved,
            report.stats.cache_hits,
            report.stats.skipped,
            self.resolver.cache().len().await
        );
        report
    }
}

/// Drain found subdomains as they arrive, echo them, drop duplicates.
async fn collect(found_rx: mpsc::Receiver<Subdomain>) -> Vec<Subdomain> {
    let mut seen = HashSet::new();
    let mut subdomains = Vec::new();

    let mut found = ReceiverStream::new(found_rx);
    while let Some(subdomain) = found.next().await {
        if seen.insert(subdomain.domain.clone()) {
            println!("{}", subdomain);
            subdomains.push(subdomain);
        }
    }

    subdomains
}

// endregion:     --- Scanner

// region:        --- Worker

#[derive(Debug, Default)]
struct WorkerStats {
    resolved: usize,
    unresolved: usize,
    cache_hits: usize,
    skipped: usize,
}

impl WorkerStats {
    fn add_to(&self, stats: &mut ScanStats) {
        stats.resolved += self.resolved;
        stats.unresolved += self.unresolved;
        stats.cache_hits += self.cache_hits;
        stats.skipped += self.skipped;
    }
}

struct Worker {
    id: usize,
    resolver: Arc<Resolver>,
    enricher: Option<Arc<Enricher>>,
    found_tx: mpsc::Sender<Subdomain>,
    cancel: CancellationToken,
}

impl Worker {
    /// Resolve the batch in order. Only fresh confirmations are sent, a
    /// cache hit means the same name was already reported. Cancellation
    /// stops new lookups and HTTP requests, a lookup already running is
    /// waited for.
    #[instrument(name = "worker", level = "debug", skip_all, fields(id = self.id))]
    async fn run(self, batch: Vec<String>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        debug!("Start batch of {}", batch.len());

        for (position, candidate) in batch.iter().enumerate() {
            if self.cancel.is_cancelled() {
                stats.skipped += batch.len() - position;
                break;
            }

            let (outcome, source) = self.resolver.resolve(candidate, &self.cancel).await;
            match source {
                OutcomeSource::Cancelled => {
                    stats.skipped += batch.len() - position;
                    break;
                }
                OutcomeSource::Cache => stats.cache_hits += 1,
                OutcomeSource::Network => {}
            }

            let ips = match outcome {
                ResolutionOutcome::Resolved(ips) => ips,
                ResolutionOutcome::Unresolved { .. } => {
                    stats.unresolved += 1;
                    continue;
                }
            };
            stats.resolved += 1;
            if source == OutcomeSource::Cache {
                continue;
            }

            // a name confirmed after the abort is kept, just not probed
            let enrichment = match &self.enricher {
                Some(enricher) => tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    info = enricher.enrich(candidate) => Some(info),
                },
                None => None,
            };
            let subdomain = Subdomain {
                domain: candidate.clone(),
                ips,
                enrichment,
            };
            if self.found_tx.send(subdomain).await.is_err() {
                warn!("Collector is gone, stopping");
                break;
            }
        }

        stats
    }
}

// endregion:     --- Worker

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::tests::MockLookup;
    use crate::enrich::tests::{RefusedFetch, StaticFetch};
    use crate::model::EnrichmentInfo;
    use crate::wordlist::build_candidates;
    use std::time::Duration;

    fn config() -> ScanConfig {
        ScanConfig {
            domain: "example.com".to_string(),
            retry: 1,
            retry_wait: Duration::ZERO,
            ..Default::default()
        }
    }

    fn words(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    fn known_hosts() -> Arc<MockLookup> {
        Arc::new(MockLookup::with_answers(&[
            ("www.example.com", "93.184.216.34"),
            ("mail.example.com", "93.184.216.35"),
        ]))
    }

    #[tokio::test]
    async fn confirms_only_resolving_candidates() {
        let lookup = known_hosts();
        let scanner = Scanner::new(&config(), lookup.clone(), None);
        let candidates = build_candidates(&words(&["www", "mail", "bogus123xyz"]), "example.com");

        let mut report = scanner.scan(candidates).await;
        report.sort();

        assert_eq!(vec!["mail.example.com", "www.example.com"], report.domains());
        assert_eq!(3, report.stats.candidates);
        assert_eq!(2, report.stats.resolved);
        assert_eq!(1, report.stats.unresolved);
        assert!(!report.cancelled);
        // bogus: first attempt + 1 retry
        assert_eq!(2, lookup.calls("bogus123xyz.example.com"));
    }

    #[tokio::test]
    async fn duplicates_are_resolved_once() {
        let lookup = known_hosts();
        let scanner = Scanner::new(&config(), lookup.clone(), None);
        let candidates = build_candidates(&words(&["www", "www", "nope", "nope"]), "example.com");

        let report = scanner.scan(candidates).await;

        assert_eq!(vec!["www.example.com"], report.domains());
        assert_eq!(1, lookup.calls("www.example.com"));
        assert_eq!(2, lookup.calls("nope.example.com"));
        assert_eq!(2, report.stats.cache_hits);
    }

    #[tokio::test]
    async fn every_candidate_is_processed_across_batches() {
        let answers: Vec<(String, String)> = (0..105)
            .map(|i| (format!("h{}.example.com", i), format!("10.0.0.{}", i % 250)))
            .collect();
        let answers: Vec<(&str, &str)> = answers
            .iter()
            .map(|(name, ip)| (name.as_str(), ip.as_str()))
            .collect();
        let lookup = Arc::new(MockLookup::with_answers(&answers));
        let config = ScanConfig {
            batch_size: 50,
            threads: 2,
            ..config()
        };
        let scanner = Scanner::new(&config, lookup.clone(), None);
        let entries: Vec<String> = (0..105).map(|i| format!("h{}", i)).collect();

        let report = scanner.scan(build_candidates(&entries, "example.com")).await;

        assert_eq!(105, report.subdomains.len());
        assert_eq!(105, lookup.total_calls());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn threads_bound_concurrency() {
        let entries: Vec<String> = (0..40).map(|i| format!("w{}", i)).collect();
        let lookup = Arc::new(MockLookup::default().with_delay(Duration::from_millis(5)));
        let config = ScanConfig {
            threads: 3,
            batch_size: 1,
            retry: 0,
            rate_limit: 100,
            ..config()
        };
        let scanner = Scanner::new(&config, lookup.clone(), None);

        let report = scanner.scan(build_candidates(&entries, "example.com")).await;

        assert!(report.is_empty());
        assert_eq!(40, lookup.total_calls());
        assert!(lookup.peak_in_flight() <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rate_limit_bounds_lookups_in_flight() {
        let entries: Vec<String> = (0..40).map(|i| format!("w{}", i)).collect();
        let lookup = Arc::new(MockLookup::default().with_delay(Duration::from_millis(5)));
        let config = ScanConfig {
            threads: 20,
            batch_size: 1,
            retry: 0,
            rate_limit: 2,
            ..config()
        };
        let scanner = Scanner::new(&config, lookup.clone(), None);

        scanner.scan(build_candidates(&entries, "example.com")).await;

        assert_eq!(40, lookup.total_calls());
        assert!(lookup.peak_in_flight() <= 2);
    }

    #[tokio::test]
    async fn failed_enrichment_keeps_the_subdomain() {
        let config = ScanConfig {
            status_code: true,
            title: true,
            ..config()
        };
        let scanner = Scanner::new(&config, known_hosts(), Some(Arc::new(RefusedFetch)));

        let report = scanner
            .scan(build_candidates(&words(&["www"]), "example.com"))
            .await;

        assert_eq!(vec!["www.example.com"], report.domains());
        assert_eq!(
            Some(EnrichmentInfo::default()),
            report.subdomains[0].enrichment
        );
    }

    #[tokio::test]
    async fn enrichment_is_attached() {
        let config = ScanConfig {
            title: true,
            ..config()
        };
        let fetch = Arc::new(StaticFetch::new(200, "<title> Mail </title>"));
        let scanner = Scanner::new(&config, known_hosts(), Some(fetch));

        let report = scanner
            .scan(build_candidates(&words(&["mail", "bogus"]), "example.com"))
            .await;

        assert_eq!(1, report.subdomains.len());
        let info = report.subdomains[0].enrichment.as_ref().unwrap();
        assert_eq!(None, info.status_code);
        assert_eq!(Some("Mail".to_string()), info.title);
    }

    #[tokio::test]
    async fn disabled_enrichment_sends_no_request() {
        let fetch = Arc::new(StaticFetch::new(200, ""));
        let scanner = Scanner::new(&config(), known_hosts(), Some(fetch.clone()));

        let report = scanner
            .scan(build_candidates(&words(&["www"]), "example.com"))
            .await;

        assert_eq!(None, report.subdomains[0].enrichment);
        assert_eq!(0, fetch.calls.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelled_scan_returns_partial_report() {
        let lookup = known_hosts();
        let scanner = Scanner::new(&config(), lookup.clone(), None);
        scanner.cancellation_token().cancel();

        let report = scanner
            .scan(build_candidates(&words(&["www", "mail", "api"]), "example.com"))
            .await;

        assert!(report.cancelled);
        assert!(report.is_empty());
        assert_eq!(3, report.stats.skipped);
        assert_eq!(0, lookup.total_calls());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_scan_keeps_what_was_found() {
        let names: Vec<String> = (0..6).map(|i| format!("w{}.example.com", i)).collect();
        let answers: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "10.0.0.1")).collect();
        let lookup =
            Arc::new(MockLookup::with_answers(&answers).with_delay(Duration::from_millis(100)));
        let config = ScanConfig {
            threads: 1,
            batch_size: 2,
            ..config()
        };
        let scanner = Scanner::new(&config, lookup.clone(), None);
        let cancel = scanner.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        });
        let entries: Vec<String> = (0..6).map(|i| format!("w{}", i)).collect();

        let report = scanner.scan(build_candidates(&entries, "example.com")).await;

        // first lookup done before the abort, second one in flight and drained
        assert!(report.cancelled);
        assert_eq!(2, report.subdomains.len());
        assert_eq!(2, report.stats.resolved);
        assert_eq!(4, report.stats.skipped);
        assert_eq!(2, lookup.total_calls());
    }

    /// Confirms every name and cancels the scan while doing so.
    #[derive(Default)]
    struct CancelDuringLookup {
        cancel: std::sync::OnceLock<CancellationToken>,
    }

    #[async_trait::async_trait]
    impl Lookup for CancelDuringLookup {
        async fn lookup_ip(&self, _name: &str) -> Result<Vec<std::net::IpAddr>> {
            if let Some(cancel) = self.cancel.get() {
                cancel.cancel();
            }
            Ok(vec!["10.0.0.1".parse().unwrap()])
        }
    }

    #[tokio::test]
    async fn no_http_request_after_cancel() {
        let config = ScanConfig {
            status_code: true,
            ..config()
        };
        let lookup = Arc::new(CancelDuringLookup::default());
        let fetch = Arc::new(StaticFetch::new(200, ""));
        let scanner = Scanner::new(&config, lookup.clone(), Some(fetch.clone()));
        assert!(lookup.cancel.set(scanner.cancellation_token()).is_ok());

        let report = scanner
            .scan(build_candidates(&words(&["www", "mail"]), "example.com"))
            .await;

        assert!(report.cancelled);
        assert_eq!(vec!["www.example.com"], report.domains());
        assert_eq!(None, report.subdomains[0].enrichment);
        assert_eq!(1, report.stats.skipped);
        assert_eq!(0, fetch.calls.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_candidate_list() {
        let scanner = Scanner::new(&config(), known_hosts(), None);

        let report = scanner.scan(Vec::new()).await;

        assert!(report.is_empty());
        assert_eq!(0, report.stats.candidates);
        assert_eq!(0, report.stats.skipped);
    }
}
