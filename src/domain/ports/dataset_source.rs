//! Dataset Source Port
//!
//! Defines where raw geolocation datasets come from.

use crate::domain::errors::RefreshError;
use async_trait::async_trait;
use bytes::Bytes;

/// Source of the raw IP-range and geosite datasets.
///
/// Only the refresher calls this. Implementations report unreachable
/// or rejected downloads as `RefreshError::FetchFailed`.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Raw IP-range to country data.
    async fn fetch_ip_ranges(&self) -> Result<Bytes, RefreshError>;

    /// Raw GEOSITE:CN direct-list data.
    async fn fetch_geosite_cn_list(&self) -> Result<Bytes, RefreshError>;
}
