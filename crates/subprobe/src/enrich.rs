use crate::model::EnrichmentInfo;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use select::document::Document;
use select::predicate::Name;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

// region:        --- HTTP fetch

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub status: u16,
    /// Only read for `200 OK` answers when asked for.
    pub body: Option<String>,
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &str, with_body: bool) -> Result<Page>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        debug!("HTTP Client created: {:?}", client);
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(name = "HTTP_request", level = "debug", skip_all, fields(url = url))]
    async fn get(&self, url: &str, with_body: bool) -> Result<Page> {
        let res = match self.client.get(url).send().await {
            Ok(res) => {
                info!("Receive with status: {}", res.status());
                res
            }
            Err(err) => {
                debug!("Reason: {}", err);
                return Err(err.into());
            }
        };

        let status = res.status();
        let body = if with_body && status == StatusCode::OK {
            match res.text().await {
                Ok(body) => Some(body),
                Err(err) => {
                    error!("Reading body: {}", err);
                    None
                }
            }
        } else {
            None
        };

        Ok(Page {
            status: status.as_u16(),
            body,
        })
    }
}

// endregion:     --- HTTP fetch

// region:        --- Enricher

/// HTTP status and page title of a confirmed subdomain. Both come from a
/// single GET on `http://<subdomain>`.
pub struct Enricher {
    fetcher: Arc<dyn Fetch>,
    status_code: bool,
    title: bool,
}

impl Enricher {
    /// `None` when neither check is enabled.
    pub fn new(fetcher: Arc<dyn Fetch>, status_code: bool, title: bool) -> Option<Self> {
        if !status_code && !title {
            return None;
        }
        Some(Self {
            fetcher,
            status_code,
            title,
        })
    }

    pub async fn enrich(&self, subdomain: &str) -> EnrichmentInfo {
        let url = format!("http://{}", subdomain);
        let mut info = EnrichmentInfo::default();

        match self.fetcher.get(&url, self.title).await {
            Ok(page) => {
                if self.status_code {
                    info.status_code = Some(page.status);
                }
                if self.title && page.status == StatusCode::OK.as_u16() {
                    info.title = page.body.as_deref().and_then(extract_title);
                }
            }
            Err(err) => debug!("{:12} - {}: {}", "NO HTTP", subdomain, err),
        }

        info
    }
}

/// Trimmed text of the first `<title>` element, if not empty.
pub fn extract_title(html: &str) -> Option<String> {
    Document::from(html)
        .find(Name("title"))
        .next()
        .map(|node| node.text().trim().to_string())
        .filter(|title| !title.is_empty())
}

// endregion:     --- Enricher
