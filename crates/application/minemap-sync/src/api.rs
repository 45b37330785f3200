//! Listing service client

use async_trait::async_trait;
use minemap_core::{ListingQuery, ListingRecord, NewListing};
use serde::Deserialize;
use url::Url;

use crate::{Result, SyncError};

/// Remote listing operations the sync driver depends on
#[async_trait]
pub trait ListingsApi: Send + Sync + 'static {
    async fn fetch(&self, query: &ListingQuery) -> Result<Vec<ListingRecord>>;
    async fn create(&self, draft: &NewListing) -> Result<ListingRecord>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// `ListingsApi` over HTTP against `{base}/listings`
#[derive(Debug, Clone)]
pub struct HttpListingsApi {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpListingsApi {
    pub fn new(base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Self::with_client(client, base)
    }

    pub fn with_client(client: reqwest::Client, base: &str) -> Result<Self> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client,
            endpoint: base.join("listings")?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(SyncError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ListingsApi for HttpListingsApi {
    async fn fetch(&self, query: &ListingQuery) -> Result<Vec<ListingRecord>> {
        tracing::debug!(url = %self.endpoint, ?query, "fetching listings");
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create(&self, draft: &NewListing) -> Result<ListingRecord> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(draft)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
