use derive_more::From;
use std::path::PathBuf;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    // -- Preconditions
    CliUsage(String),
    InvalidDomain(String),
    EmptyWordlist(PathBuf),
    Wordlist {
        path: PathBuf,
        source: std::io::Error,
    },

    // -- Lookups
    #[cfg(test)]
    Lookup(String),

    #[from]
    Resolve(hickory_resolver::error::ResolveError),

    #[from]
    Timeout(tokio::time::error::Elapsed),

    // -- Externals
    #[from]
    File(std::io::Error),

    #[from]
    Json(serde_json::Error),

    #[from]
    Reqwest(reqwest::Error),

    #[from]
    Tracing(tracing::subscriber::SetGlobalDefaultError),

    #[from]
    LogFile(tracing_appender::rolling::InitError),
}

// region:    --- Error Boilerplate

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate
