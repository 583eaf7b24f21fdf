//! City of Melbourne Open Data client for on-street bay sensors.

use std::time::Duration;

use async_trait::async_trait;
use kerbside_core::RecordBatch;
use reqwest::Client;
use serde_json::Value;

use crate::source::{decode_records, BaySource, FeedError};

pub const DEFAULT_FEED_URL: &str =
    "https://data.melbourne.vic.gov.au/api/explore/v2.1/catalog/datasets/on-street-parking-bay-sensors/records";

/// The API rejects pages larger than this.
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_MAX_RECORDS: usize = 5000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Paginating HTTP client for the sensor dataset.
pub struct MelbourneClient {
    client: Client,
    base_url: String,
    page_size: usize,
    max_records: usize,
}

impl MelbourneClient {
    /// Create a client. `page_size` is capped at [`MAX_PAGE_SIZE`].
    pub fn new(base_url: impl Into<String>, page_size: usize, max_records: usize) -> Result<Self, FeedError> {
        let base_url = base_url.into();
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| FeedError::Http {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self::with_client(client, base_url, page_size, max_records))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, page_size: usize, max_records: usize) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            max_records,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch pages until the dataset or `max_records` is exhausted.
    ///
    /// Undecodable entries count towards `max_records` and the page offset.
    pub async fn fetch_all(&self) -> Result<RecordBatch, FeedError> {
        let mut batch = RecordBatch::default();

        while batch.received() < self.max_records {
            let offset = batch.received();
            let limit = self.page_size.min(self.max_records - offset);
            let payload = self.fetch_page(offset, limit).await?;
            let total_count = payload.get("total_count").and_then(Value::as_u64);

            let page = decode_records(&payload)?;
            let received = page.received();
            batch.extend(page);

            tracing::debug!(
                "Fetched page at offset {}: {} records (total_count {:?})",
                offset,
                received,
                total_count
            );

            if received < limit {
                break;
            }
            if total_count.is_some_and(|total| batch.received() as u64 >= total) {
                break;
            }
        }

        if batch.rejected > 0 {
            tracing::warn!("{} entries from {} are not bay records", batch.rejected, self.base_url);
        }
        Ok(batch)
    }

    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Value, FeedError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await
            .map_err(|source| self.http_error(source))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                url: self.base_url.clone(),
                status,
                body: truncate(&body, 500),
            });
        }

        response.json::<Value>().await.map_err(|err| FeedError::Decode {
            what: format!("page at offset {offset}"),
            reason: err.to_string(),
        })
    }

    fn http_error(&self, source: reqwest::Error) -> FeedError {
        if source.is_timeout() {
            FeedError::Timeout(REQUEST_TIMEOUT)
        } else {
            FeedError::Http {
                url: self.base_url.clone(),
                source,
            }
        }
    }
}

#[async_trait]
impl BaySource for MelbourneClient {
    fn name(&self) -> &str {
        "melbourne-open-data"
    }

    async fn fetch(&self) -> Result<RecordBatch, FeedError> {
        self.fetch_all().await
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}
