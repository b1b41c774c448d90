//! HTTP Dataset Source
//!
//! Implements DatasetSource by downloading both datasets over HTTP(S).

use crate::domain::errors::RefreshError;
use crate::domain::ports::DatasetSource;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Downloads the IP-range and geosite datasets from fixed URLs.
///
/// Any transport error or non-2xx status is a `RefreshError::FetchFailed`.
pub struct HttpDatasetSource {
    client: reqwest::Client,
    ip_ranges_url: String,
    geosite_url: String,
}

impl HttpDatasetSource {
    pub fn new(ip_ranges_url: impl Into<String>, geosite_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .user_agent(concat!("rule-advisor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            ip_ranges_url: ip_ranges_url.into(),
            geosite_url: geosite_url.into(),
        })
    }

    async fn download(&self, url: &str) -> Result<Bytes, RefreshError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RefreshError::FetchFailed(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::FetchFailed(format!(
                "{}: HTTP {}",
                url,
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RefreshError::FetchFailed(format!("{}: {}", url, e)))?;
        tracing::debug!(url = %url, bytes = body.len(), "dataset downloaded");
        Ok(body)
    }
}

#[async_trait]
impl DatasetSource for HttpDatasetSource {
    async fn fetch_ip_ranges(&self) -> Result<Bytes, RefreshError> {
        self.download(&self.ip_ranges_url).await
    }

    async fn fetch_geosite_cn_list(&self) -> Result<Bytes, RefreshError> {
        self.download(&self.geosite_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_failure() {
        // port 9 (discard) on loopback is closed in test environments
        let source = HttpDatasetSource::new("http://127.0.0.1:9/ip.txt", "http://127.0.0.1:9/site.txt").unwrap();
        let err = source.fetch_ip_ranges().await.unwrap_err();
        assert!(matches!(err, RefreshError::FetchFailed(msg) if msg.contains("127.0.0.1:9/ip.txt")));
    }
}
