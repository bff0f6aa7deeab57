use crate::utils::ensure_dir;
use crate::Result;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use time::OffsetDateTime;

// region:        --- Models

/// Classification of one candidate after DNS resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// At least one address was returned, in resolver order.
    Resolved(Vec<String>),
    /// Every attempt failed or returned no address. `reason` keeps the last
    /// diagnostic for logs, it is never surfaced as an error.
    Unresolved { reason: Option<String> },
}

impl ResolutionOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl EnrichmentInfo {
    pub fn is_empty(&self) -> bool {
        self.status_code.is_none() && self.title.is_none()
    }
}

/// A confirmed subdomain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subdomain {
    pub domain: String,
    pub ips: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentInfo>,
}

impl fmt::Display for Subdomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subdomain found: {} (IPs: {})",
            self.domain,
            self.ips.join(", ")
        )?;
        if let Some(info) = &self.enrichment {
            if let Some(status_code) = info.status_code {
                write!(f, " | Status Code: {}", status_code)?;
            }
            if let Some(title) = &info.title {
                write!(f, " | Title: {}", title)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub candidates: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub cache_hits: usize,
    /// Candidates never looked at because the scan was cancelled.
    pub skipped: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ScanReport {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub cancelled: bool,
    pub stats: ScanStats,
    pub subdomains: Vec<Subdomain>,
}

impl ScanReport {
    pub fn new(started_at: OffsetDateTime) -> Self {
        Self {
            started_at,
            cancelled: false,
            stats: ScanStats::default(),
            subdomains: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subdomains.is_empty()
    }

    pub fn domains(&self) -> Vec<&str> {
        self.subdomains.iter().map(|s| s.domain.as_str()).collect()
    }

    /// Completion order is not stable across runs, sort by name.
    pub fn sort(&mut self) {
        self.subdomains.sort_by(|a, b| a.domain.cmp(&b.domain));
    }
}

// endregion:     --- Models

// region:        --- Exporting utils

/// Write one `<domain><separator>` line per subdomain.
pub fn write_to_file(subdomains: &[Subdomain], path: &Path, separator: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for subdomain in subdomains {
        writeln!(writer, "{}{}", subdomain.domain, separator)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_to_json(report: &ScanReport, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }

    let json = to_string_pretty(report)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

// endregion:     --- Exporting utils
