//! Upstream feed client
//!
//! HTTP client for the region and organisation feeds. A 404 surfaces as
//! [`FetchError::NotPublished`]; the caller decides whether that is fatal.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::types::{OrganisationFeed, RegionFeedEntry};
use crate::config::FeedConfig;
use crate::error::{ConfigError, FetchError, SyncError};

const USER_AGENT: &str = concat!("orgsync/", env!("CARGO_PKG_VERSION"));

/// Source of the two upstream feeds
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_regions(&self) -> Result<Vec<RegionFeedEntry>, FetchError>;

    async fn fetch_organisations(&self) -> Result<OrganisationFeed, FetchError>;
}

pub struct HttpFeedClient {
    client: Client,
    regions_url: Url,
    organisations_url: Url,
}

impl HttpFeedClient {
    pub fn new(config: &FeedConfig) -> Result<Self, SyncError> {
        let regions_url = config.regions_url()?;
        let organisations_url = config.organisations_url()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            regions_url,
            organisations_url,
        })
    }

    /// Build a client against explicit endpoints
    pub fn with_urls(regions_url: &str, organisations_url: &str) -> Result<Self, SyncError> {
        let config = FeedConfig {
            regions_url: regions_url.to_string(),
            organisations_url: organisations_url.to_string(),
            ..FeedConfig::default()
        };
        Self::new(&config)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        tracing::debug!(%url, "Fetching feed");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotPublished {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        tracing::debug!(%url, bytes = body.len(), "Feed downloaded");

        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedClient {
    async fn fetch_regions(&self) -> Result<Vec<RegionFeedEntry>, FetchError> {
        self.get_json(&self.regions_url).await
    }

    async fn fetch_organisations(&self) -> Result<OrganisationFeed, FetchError> {
        self.get_json(&self.organisations_url).await
    }
}
