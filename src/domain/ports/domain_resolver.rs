//! Domain Resolver Port
//!
//! Defines how the classifier obtains addresses and nameservers.

use crate::domain::entities::ResolutionResult;
use async_trait::async_trait;

/// Resolves domains to IP addresses and authoritative nameservers.
///
/// Provider failures never surface as errors here: they are recorded in
/// `ResolutionResult::provider_errors` and the sets are left empty.
#[async_trait]
pub trait DomainResolver: Send + Sync {
    /// Resolve the addresses of `domain`.
    async fn resolve_ips(&self, domain: &str) -> ResolutionResult;

    /// Resolve the NS hostnames of `domain`.
    async fn resolve_nameservers(&self, domain: &str) -> ResolutionResult;
}
