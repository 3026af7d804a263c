use super::ImageFetcher;
use crate::error::{Result, VideoError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        info!("Downloading image from: {}", url);

        let response = self.client.get(url).send().await?.error_for_status()?;
        let data = response.bytes().await?;

        if data.is_empty() {
            return Err(VideoError::asset(url, "server returned an empty body"));
        }

        Ok(data.to_vec())
    }
}
