use crate::{Error, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

pub fn load_wordlist(path: &Path) -> Result<Vec<String>> {
    let wordlist = File::open(path)
        .and_then(|file| parse_wordlist(BufReader::new(file)))
        .map_err(|source| Error::Wordlist {
            path: path.to_path_buf(),
            source,
        })?;

    if wordlist.is_empty() {
        return Err(Error::EmptyWordlist(path.to_path_buf()));
    }

    info!("{:12} - {} entries from {:?}", "WORDLIST", wordlist.len(), path);
    Ok(wordlist)
}

/// One entry per line, trimmed, blank lines skipped.
pub fn parse_wordlist<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut entries = Vec::new();
    for line in reader.lines() {
        let entry = line?;
        let entry = entry.trim();
        if !entry.is_empty() {
            entries.push(entry.to_string());
        }
    }
    Ok(entries)
}

/// `<entry>.<domain>` for every entry, in wordlist order. Duplicates are kept,
/// the resolution cache absorbs them.
pub fn build_candidates(entries: &[String], domain: &str) -> Vec<String> {
    let candidates: Vec<String> = entries
        .iter()
        .map(|entry| entry.trim_end_matches('.').to_lowercase())
        .filter(|entry| !entry.is_empty())
        .map(|entry| format!("{}.{}", entry, domain))
        .collect();

    debug!("{} candidates for {}", candidates.len(), domain);
    candidates
}

/// Split into contiguous batches of `size`, the last one may be shorter.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}
