use crate::{Error, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use lazy_regex::regex_is_match;
use std::path::PathBuf;
use std::time::Duration;

// region:        --- Defaults

pub const DEFAULT_THREADS: usize = 100;
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_RETRY: usize = 2;
pub const DEFAULT_RETRY_WAIT_MS: u64 = 100;
pub const DEFAULT_RATE_LIMIT: usize = 200;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_SEPARATOR: &str = ",";
pub const HTTP_REQUEST_TIMEOUT_MS: u64 = 10000;

// endregion:     --- Defaults

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub domain: String,
    pub wordlist: PathBuf,
    pub threads: usize,
    pub timeout: Duration,
    pub retry: usize,
    pub retry_wait: Duration,
    pub rate_limit: usize,
    pub batch_size: usize,
    pub output: Option<PathBuf>,
    pub separator: String,
    pub format: OutputFormat,
    pub status_code: bool,
    pub title: bool,
    pub http_timeout: Duration,
    pub sort: bool,
    pub logs: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            wordlist: PathBuf::new(),
            threads: DEFAULT_THREADS,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry: DEFAULT_RETRY,
            retry_wait: Duration::from_millis(DEFAULT_RETRY_WAIT_MS),
            rate_limit: DEFAULT_RATE_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            output: None,
            separator: DEFAULT_SEPARATOR.to_string(),
            format: OutputFormat::Txt,
            status_code: false,
            title: false,
            http_timeout: Duration::from_millis(HTTP_REQUEST_TIMEOUT_MS),
            sort: false,
            logs: None,
        }
    }
}

impl ScanConfig {
    pub fn from_matches(args: &ArgMatches) -> Result<Self> {
        let defaults = Self::default();

        let format = match args.get_one::<String>("format").map(String::as_str) {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Txt,
        };

        let config = Self {
            domain: normalize_domain(args.get_one::<String>("domain").map_or("", String::as_str)),
            wordlist: args
                .get_one::<PathBuf>("wordlist")
                .cloned()
                .unwrap_or_default(),
            threads: copied_or(args, "threads", defaults.threads),
            timeout: copied_or(args, "timeout", defaults.timeout),
            retry: copied_or(args, "retry", defaults.retry),
            retry_wait: copied_or(args, "retry-wait", defaults.retry_wait),
            rate_limit: copied_or(args, "rate-limit", defaults.rate_limit),
            batch_size: copied_or(args, "batch-size", defaults.batch_size),
            output: args.get_one::<PathBuf>("output").cloned(),
            separator: args
                .get_one::<String>("separator")
                .cloned()
                .unwrap_or(defaults.separator),
            format,
            status_code: args.get_flag("status-code"),
            title: args.get_flag("title"),
            http_timeout: copied_or(args, "http-timeout", defaults.http_timeout),
            sort: args.get_flag("sort"),
            logs: args.get_one::<PathBuf>("logs").cloned(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.domain.is_empty() {
            return Err(Error::CliUsage("a target domain is required".into()));
        }
        if !is_valid_domain(&self.domain) {
            return Err(Error::InvalidDomain(self.domain.clone()));
        }
        if self.wordlist.as_os_str().is_empty() {
            return Err(Error::CliUsage("no wordlist file provided".into()));
        }
        for (name, value) in [
            ("threads", self.threads),
            ("rate-limit", self.rate_limit),
            ("batch-size", self.batch_size),
        ] {
            if value == 0 {
                return Err(Error::CliUsage(format!("--{} must be at least 1", name)));
            }
        }
        if self.timeout.is_zero() {
            return Err(Error::CliUsage("--timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn wants_enrichment(&self) -> bool {
        self.status_code || self.title
    }
}

pub fn command() -> Command {
    Command::new(clap::crate_name!())
        .version(clap::crate_version!())
        .about("Brute force subdomains of a domain from a wordlist")
        .arg(
            Arg::new("domain")
                .short('d')
                .long("domain")
                .value_name("DOMAIN")
                .help("Domain to scan subdomains for")
                .required(true),
        )
        .arg(
            Arg::new("wordlist")
                .short('w')
                .long("wordlist")
                .value_name("FILE")
                .help("Wordlist file, one subdomain prefix per line")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("N")
                .help("Number of concurrent workers")
                .value_parser(value_parser!(usize))
                .default_value("100"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("DURATION")
                .help("Timeout of one DNS resolution attempt")
                .value_parser(humantime::parse_duration)
                .default_value("2s"),
        )
        .arg(
            Arg::new("retry")
                .long("retry")
                .value_name("N")
                .help("Retries after a failed DNS resolution attempt")
                .value_parser(value_parser!(usize))
                .default_value("2"),
        )
        .arg(
            Arg::new("retry-wait")
                .long("retry-wait")
                .value_name("DURATION")
                .help("Wait between DNS resolution attempts")
                .value_parser(humantime::parse_duration)
                .default_value("100ms"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file to save results")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("separator")
                .long("separator")
                .value_name("SEP")
                .help("Appended to each line of the output file")
                .allow_hyphen_values(true)
                .default_value(DEFAULT_SEPARATOR),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .help("Output file format")
                .value_parser(["txt", "json"])
                .default_value("txt"),
        )
        .arg(
            Arg::new("rate-limit")
                .long("rate-limit")
                .value_name("N")
                .help("DNS queries allowed in flight")
                .value_parser(value_parser!(usize))
                .default_value("200"),
        )
        .arg(
            Arg::new("batch-size")
                .long("batch-size")
                .value_name("N")
                .help("Candidates handed to one worker")
                .value_parser(value_parser!(usize))
                .default_value("50"),
        )
        .arg(
            Arg::new("status-code")
                .long("status-code")
                .action(ArgAction::SetTrue)
                .help("Check HTTP status code of subdomains"),
        )
        .arg(
            Arg::new("title")
                .long("title")
                .action(ArgAction::SetTrue)
                .help("Retrieve title of subdomains"),
        )
        .arg(
            Arg::new("http-timeout")
                .long("http-timeout")
                .value_name("DURATION")
                .help("Timeout of the status code and title request")
                .value_parser(humantime::parse_duration)
                .default_value("10s"),
        )
        .arg(
            Arg::new("sort")
                .long("sort")
                .action(ArgAction::SetTrue)
                .help("Sort found subdomains by name"),
        )
        .arg(
            Arg::new("logs")
                .short('s')
                .long("logs")
                .value_name("FILE")
                .help("Also save logs into this file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg_required_else_help(true)
}

fn copied_or<T: Clone + Send + Sync + 'static>(args: &ArgMatches, id: &str, default: T) -> T {
    args.get_one::<T>(id).cloned().unwrap_or(default)
}

/// Trimmed, lowercased, without trailing dot.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_lowercase()
}

pub fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= 253
        && regex_is_match!(
            r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$",
            domain
        )
}
