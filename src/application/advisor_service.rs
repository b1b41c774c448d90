//! Advisor Service - Main application use case
//!
//! Front door for callers: loads the current rule lists and index snapshot
//! and hands them to the [`Classifier`].

use crate::application::Classifier;
use crate::domain::entities::ClassificationVerdict;
use crate::domain::errors::ClassifyError;
use crate::domain::ports::{DomainResolver, RuleStore};
use crate::domain::value_objects::{ClassifyMode, RuleKind};
use crate::infrastructure::GeoIndexSlot;
use serde::Serialize;
use std::sync::Arc;

/// Counters reported by [`AdvisorService::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvisorStats {
    pub index_version: u64,
    pub ip_ranges: usize,
    pub geosite_entries: usize,
    pub direct_rules: usize,
    /// `None` when no proxy list is configured
    pub proxy_rules: Option<usize>,
}

pub struct AdvisorService {
    rules: Arc<dyn RuleStore>,
    slot: Arc<GeoIndexSlot>,
    classifier: Classifier,
}

impl AdvisorService {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        slot: Arc<GeoIndexSlot>,
        resolver: Arc<dyn DomainResolver>,
    ) -> Self {
        Self {
            rules,
            slot,
            classifier: Classifier::new(resolver),
        }
    }

    /// Suggest a rule kind for `raw_input`.
    pub async fn check(&self, raw_input: &str) -> Result<ClassificationVerdict, ClassifyError> {
        self.classify(raw_input, ClassifyMode::Suggest).await
    }

    /// Validate a request to add `raw_input` as a `kind` rule.
    pub async fn request(
        &self,
        raw_input: &str,
        kind: RuleKind,
    ) -> Result<ClassificationVerdict, ClassifyError> {
        self.classify(raw_input, ClassifyMode::Request(kind)).await
    }

    pub async fn stats(&self) -> AdvisorStats {
        let index = self.slot.snapshot();
        let (ip_ranges, geosite_entries) = index.size();
        let direct_rules = self.rules.list_direct_domains().await.len();
        let proxy_rules = self.rules.list_proxy_domains().await.map(|p| p.len());

        AdvisorStats {
            index_version: self.slot.version(),
            ip_ranges,
            geosite_entries,
            direct_rules,
            proxy_rules,
        }
    }

    async fn classify(
        &self,
        raw_input: &str,
        mode: ClassifyMode,
    ) -> Result<ClassificationVerdict, ClassifyError> {
        // one snapshot for the whole request
        let index = self.slot.snapshot();
        let direct = self.rules.list_direct_domains().await;
        let proxy = self.rules.list_proxy_domains().await;

        self.classifier
            .classify(raw_input, &direct, proxy.as_ref(), &index, mode)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{GeoSiteEntry, ResolutionResult};
    use crate::domain::services::GeoIndex;
    use crate::domain::value_objects::{CountryCode, Recommendation};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::net::IpAddr;

    // ===== Mock Implementations =====

    struct MockRules {
        direct: HashSet<String>,
        proxy: Option<HashSet<String>>,
    }

    #[async_trait]
    impl RuleStore for MockRules {
        async fn list_direct_domains(&self) -> HashSet<String> {
            self.direct.clone()
        }

        async fn list_proxy_domains(&self) -> Option<HashSet<String>> {
            self.proxy.clone()
        }
    }

    /// Answers every address query with the same IP.
    struct SingleIpResolver(IpAddr);

    #[async_trait]
    impl DomainResolver for SingleIpResolver {
        async fn resolve_ips(&self, domain: &str) -> ResolutionResult {
            let mut result = ResolutionResult::new(domain);
            result.resolved_ips.insert(self.0);
            result
        }

        async fn resolve_nameservers(&self, domain: &str) -> ResolutionResult {
            ResolutionResult::new(domain)
        }
    }

    fn cn_index() -> GeoIndex {
        GeoIndex::from_parts(
            vec![(
                "1.0.1.0".parse().unwrap(),
                "1.0.1.255".parse().unwrap(),
                CountryCode::CHINA,
            )],
            vec![GeoSiteEntry::suffix("baidu.com", "CN")],
        )
        .unwrap()
    }

    fn service(ip: &str, proxy: Option<&[&str]>) -> (Arc<GeoIndexSlot>, AdvisorService) {
        let rules = MockRules {
            direct: ["bilibili.com".to_string()].into_iter().collect(),
            proxy: proxy.map(|p| p.iter().map(|s| s.to_string()).collect()),
        };
        let slot = Arc::new(GeoIndexSlot::empty());
        let service = AdvisorService::new(
            Arc::new(rules),
            slot.clone(),
            Arc::new(SingleIpResolver(ip.parse().unwrap())),
        );
        (slot, service)
    }

    #[tokio::test]
    async fn test_check_uses_current_index() {
        let (slot, service) = service("1.0.1.1", None);

        // empty index: the address has no known country
        let verdict = service.check("example.com").await.unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Proxy);

        slot.swap(cn_index());
        let verdict = service.check("example.com").await.unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Direct);
    }

    #[tokio::test]
    async fn test_check_reports_existing_rule() {
        let (_slot, service) = service("1.0.1.1", None);
        let verdict = service.check("www.bilibili.com").await.unwrap();
        assert!(verdict.already_direct);
        assert_eq!(verdict.recommendation, Recommendation::None);
    }

    #[tokio::test]
    async fn test_request_proxy_rejected_for_china_address() {
        let (slot, service) = service("1.0.1.1", Some(&[]));
        slot.swap(cn_index());

        let err = service
            .request("example.com", RuleKind::Proxy)
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::AdditionNotEligible { .. }));

        let verdict = service.request("example.com", RuleKind::Direct).await.unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Direct);
    }

    #[tokio::test]
    async fn test_stats() {
        let (slot, service) = service("1.0.1.1", Some(&["google.com", "youtube.com"]));
        slot.swap(cn_index());

        let stats = service.stats().await;
        assert_eq!(
            stats,
            AdvisorStats {
                index_version: 1,
                ip_ranges: 1,
                geosite_entries: 1,
                direct_rules: 1,
                proxy_rules: Some(2),
            }
        );
    }

    #[tokio::test]
    async fn test_stats_without_proxy_list() {
        let (_slot, service) = service("1.0.1.1", None);
        let stats = service.stats().await;
        assert_eq!(stats.proxy_rules, None);
        assert_eq!(stats.index_version, 0);
    }
}
