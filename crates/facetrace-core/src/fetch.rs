//! Image downloader: a bounded pool of concurrent HTTP GETs.
//!
//! Connect and read timeouts are per-URL misses. Every other transport
//! error aborts the batch.

use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

/// Number of downloads kept in flight at once.
pub const DEFAULT_WORKERS: usize = 6;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("GET {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download task failed: {0}")]
    Join(String),
}

/// Downloader settings.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub workers: usize,
    pub timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Clone-cheap HTTP fetcher.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    workers: usize,
}

impl Fetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        // No total deadline: a slow body that keeps arriving is not a miss.
        let client = reqwest::Client::builder()
            .connect_timeout(settings.timeout)
            .read_timeout(settings.timeout)
            .user_agent(concat!("facetrace/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            workers: settings.workers.max(1),
        })
    }

    /// Fetch one URL's body.
    ///
    /// Returns `Ok(None)` when the request timed out.
    pub async fn fetch_one(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        let outcome = async {
            let response = self.client.get(url).send().await?;
            tracing::debug!(url, status = %response.status(), "response received");
            response.bytes().await
        }
        .await;

        match outcome {
            Ok(body) => {
                tracing::debug!(url, bytes = body.len(), "downloaded");
                Ok(Some(body.to_vec()))
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(url, "timed out, skipping");
                Ok(None)
            }
            Err(source) => Err(FetchError::Request {
                url: url.to_string(),
                source,
            }),
        }
    }

    /// Fetch every URL with at most `workers` requests in flight.
    ///
    /// The result has one slot per input URL, in input order; timed-out URLs
    /// leave their slot empty.
    pub async fn fetch_all(&self, urls: &[String]) -> Result<Vec<Option<Vec<u8>>>, FetchError> {
        tracing::info!(count = urls.len(), workers = self.workers, "downloading images");

        let mut results: Vec<Option<Vec<u8>>> = vec![None; urls.len()];
        let mut pending = urls.iter().cloned().enumerate();
        let mut join_set = JoinSet::new();

        loop {
            while join_set.len() < self.workers {
                let Some((index, url)) = pending.next() else {
                    break;
                };
                let fetcher = self.clone();
                join_set.spawn(async move { (index, fetcher.fetch_one(&url).await) });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (index, outcome) = joined.map_err(|e| FetchError::Join(e.to_string()))?;
            // Dropping the JoinSet on error aborts the downloads still in flight.
            results[index] = outcome?;
        }

        let missing = results.iter().filter(|r| r.is_none()).count();
        tracing::info!(
            downloaded = results.len() - missing,
            missing,
            "downloads finished"
        );
        Ok(results)
    }
}
