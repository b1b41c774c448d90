//! DNS Provider Port
//!
//! One upstream resolver reachable over DNS-over-HTTPS.

use crate::domain::entities::DnsAnswer;
use crate::domain::errors::DnsError;
use crate::domain::value_objects::RecordKind;
use async_trait::async_trait;
use ipnetwork::IpNetwork;

/// A single upstream DNS provider.
///
/// Providers are capability-equivalent; the resolver treats each one
/// independently and never lets one provider's failure abort the others.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Stable name used as the key in per-provider error maps.
    fn name(&self) -> &str;

    /// Query `domain` for `kind` records.
    ///
    /// When `client_subnet` is set the query carries an EDNS client-subnet
    /// option so the authoritative server answers as if asked from there.
    async fn query(
        &self,
        domain: &str,
        kind: RecordKind,
        client_subnet: Option<IpNetwork>,
    ) -> Result<Vec<DnsAnswer>, DnsError>;
}
