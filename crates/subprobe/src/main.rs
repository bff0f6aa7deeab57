mod cache;
mod config;
mod dns;
mod enrich;
mod error;
mod limiter;
mod model;
mod scan;
mod utils;
mod wordlist;

pub use error::{Error, Result};

use config::{OutputFormat, ScanConfig};
use futures::{stream, Stream, StreamExt};
use model::{export_to_json, write_to_file, ScanReport};
use scan::Scanner;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use utils::log::init_tracing_subscriber;
use wordlist::{build_candidates, load_wordlist};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = config::command().get_matches();
    let config = ScanConfig::from_matches(&matches)?;
    init_tracing_subscriber(config.logs.as_deref())?;

    info!("{:12} - {}", "TARGET", config.domain);
    let entries = load_wordlist(&config.wordlist)?;
    let candidates = build_candidates(&entries, &config.domain);

    let scanner = Scanner::from_config(&config)?;

    let cancel = scanner.cancellation_token();
    let interrupts = stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
    });
    tokio::spawn(async move {
        if handle_interrupts(interrupts, cancel).await {
            std::process::exit(130);
        }
    });

    let mut report = scanner.scan(candidates).await;
    if config.sort {
        report.sort();
    }
    display(&report);

    if let Some(path) = &config.output {
        match persist(&report, path, &config) {
            Ok(()) => println!("Results saved to {}", path.display()),
            Err(err) => {
                error!("{:12} - {}", "OUTPUT", err);
                println!("Error writing to output file: {}", err);
            }
        }
    }

    Ok(())
}

/// First interrupt cancels the scan, which still returns what it found.
/// Returns true on a second one, the caller exits without draining.
async fn handle_interrupts(interrupts: impl Stream<Item = ()>, cancel: CancellationToken) -> bool {
    let mut interrupts = std::pin::pin!(interrupts);

    if interrupts.next().await.is_none() {
        return false;
    }
    warn!("{:12} - draining in-flight lookups, interrupt again to quit", "INTERRUPTED");
    cancel.cancel();

    if interrupts.next().await.is_none() {
        return false;
    }
    warn!("{:12} - not waiting for in-flight lookups", "ABORTED");
    true
}

fn display(report: &ScanReport) {
    if report.is_empty() {
        println!("No subdomains found.");
    } else {
        println!("Found subdomains:");
        for domain in report.domains() {
            println!("{}", domain);
        }
    }

    let stats = &report.stats;
    println!(
        "{} candidates, {} resolved, {} unresolved, {} cache hits in {}ms",
        stats.candidates, stats.resolved, stats.unresolved, stats.cache_hits, stats.elapsed_ms
    );
    if report.cancelled {
        println!("Scan interrupted, {} candidates skipped", stats.skipped);
    }
}

fn persist(report: &ScanReport, path: &Path, config: &ScanConfig) -> Result<()> {
    match config.format {
        OutputFormat::Txt => write_to_file(&report.subdomains, path, &config.separator),
        OutputFormat::Json => export_to_json(report, path),
    }
}
