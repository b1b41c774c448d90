//! Multi-Provider Resolver
//!
//! Fans address queries out to every configured DoH provider and walks the
//! nameserver providers in order until one answers.

use crate::domain::entities::{DnsAnswer, ResolutionResult};
use crate::domain::errors::DnsError;
use crate::domain::ports::{DnsProvider, DomainResolver};
use crate::domain::services::domain_name;
use crate::domain::value_objects::RecordKind;
use async_trait::async_trait;
use futures::future::join_all;
use ipnetwork::IpNetwork;
use std::sync::Arc;
use std::time::Duration;

/// Default per-provider timeout.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// [`DomainResolver`] backed by several independent DNS providers.
///
/// Address lookups carry the configured client-subnet hint so that
/// geo-aware authoritative servers answer as they would for a mainland
/// China client. Nameserver lookups never carry it.
pub struct MultiProviderResolver {
    ip_providers: Vec<Arc<dyn DnsProvider>>,
    ns_providers: Vec<Arc<dyn DnsProvider>>,
    client_subnet: Option<IpNetwork>,
    timeout: Duration,
}

impl MultiProviderResolver {
    pub fn new(
        ip_providers: Vec<Arc<dyn DnsProvider>>,
        ns_providers: Vec<Arc<dyn DnsProvider>>,
        client_subnet: Option<IpNetwork>,
    ) -> Self {
        Self {
            ip_providers,
            ns_providers,
            client_subnet,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Override the per-provider timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn query_bounded(
        &self,
        provider: &dyn DnsProvider,
        domain: &str,
        kind: RecordKind,
        client_subnet: Option<IpNetwork>,
    ) -> Result<Vec<DnsAnswer>, DnsError> {
        match tokio::time::timeout(self.timeout, provider.query(domain, kind, client_subnet)).await
        {
            Ok(result) => result,
            Err(_) => Err(DnsError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl DomainResolver for MultiProviderResolver {
    async fn resolve_ips(&self, domain: &str) -> ResolutionResult {
        let mut result = ResolutionResult::new(domain);

        let queries = self.ip_providers.iter().map(|provider| async move {
            let outcome = self
                .query_bounded(provider.as_ref(), domain, RecordKind::A, self.client_subnet)
                .await;
            (provider.name().to_string(), outcome)
        });

        for (name, outcome) in join_all(queries).await {
            match outcome {
                Ok(answers) => {
                    let before = result.resolved_ips.len();
                    for answer in answers {
                        if let DnsAnswer::Address(ip) = answer {
                            result.resolved_ips.insert(ip);
                        }
                    }
                    tracing::debug!(
                        provider = %name,
                        domain = %domain,
                        new_ips = result.resolved_ips.len() - before,
                        "address query succeeded"
                    );
                    result.provider_errors.insert(name, None);
                }
                Err(e) => {
                    tracing::warn!(provider = %name, domain = %domain, "address query failed: {}", e);
                    result.provider_errors.insert(name, Some(e));
                }
            }
        }

        if result.all_failed() {
            tracing::warn!(domain = %domain, "all address providers failed");
        }
        result
    }

    async fn resolve_nameservers(&self, domain: &str) -> ResolutionResult {
        let mut result = ResolutionResult::new(domain);

        for provider in &self.ns_providers {
            let name = provider.name().to_string();
            match self
                .query_bounded(provider.as_ref(), domain, RecordKind::Ns, None)
                .await
            {
                Ok(answers) => {
                    let hosts: Vec<String> = answers
                        .into_iter()
                        .filter_map(|answer| match answer {
                            DnsAnswer::Nameserver(host) => Some(domain_name::canonical(&host)),
                            DnsAnswer::Address(_) => None,
                        })
                        .filter(|host| !host.is_empty())
                        .collect();
                    result.provider_errors.insert(name.clone(), None);

                    if !hosts.is_empty() {
                        tracing::debug!(provider = %name, domain = %domain, count = hosts.len(), "NS query succeeded");
                        result.nameservers.extend(hosts);
                        return result;
                    }
                    tracing::debug!(provider = %name, domain = %domain, "NS query returned no records");
                }
                Err(e) => {
                    tracing::warn!(provider = %name, domain = %domain, "NS query failed: {}", e);
                    result.provider_errors.insert(name, Some(e));
                }
            }
        }

        tracing::warn!(domain = %domain, "no provider returned NS records");
        result
    }
}
