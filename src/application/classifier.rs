//! Classifier - Direct vs proxy decision use case
//!
//! Combines rule membership, geosite membership and DNS geolocation into a
//! single verdict for one domain.

use crate::domain::entities::{country_key, ClassificationVerdict, ResolutionResult};
use crate::domain::errors::ClassifyError;
use crate::domain::ports::DomainResolver;
use crate::domain::services::domain_name;
use crate::domain::services::{DecisionPolicy, GeoIndex, SignalCounts};
use crate::domain::value_objects::{
    ClassifyMode, CountryCode, ReasonCode, Recommendation, RuleKind,
};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

/// Domain classifier.
///
/// Holds no per-request state. The geo index is passed in by the caller so
/// that one request sees one snapshot from start to finish.
pub struct Classifier {
    resolver: Arc<dyn DomainResolver>,
}

impl Classifier {
    pub fn new(resolver: Arc<dyn DomainResolver>) -> Self {
        Self { resolver }
    }

    /// Classify `raw_input`.
    ///
    /// In [`ClassifyMode::Suggest`] the verdict carries whichever rule kind
    /// the evidence supports. In [`ClassifyMode::Request`] only the requested
    /// kind's predicate is checked and a failing check is an error.
    ///
    /// A domain already covered by a relevant rule set short-circuits with
    /// `Recommendation::None` before any DNS query is made.
    pub async fn classify(
        &self,
        raw_input: &str,
        direct_rules: &HashSet<String>,
        proxy_rules: Option<&HashSet<String>>,
        index: &GeoIndex,
        mode: ClassifyMode,
    ) -> Result<ClassificationVerdict, ClassifyError> {
        let domain = domain_name::normalize(raw_input)?;
        let sld = domain_name::second_level_domain(&domain);

        if domain_name::is_cn_domain(&domain) {
            return Err(ClassifyError::CnDomainRejected(domain));
        }

        let mut verdict = ClassificationVerdict::new(domain.clone(), sld.clone());
        verdict.already_direct = listed_in(direct_rules, &domain);
        verdict.already_proxy = proxy_rules
            .map(|rules| listed_in(rules, &domain))
            .unwrap_or(false);
        verdict.already_geosite_cn = index.is_direct_listed(&domain);

        if verdict.already_direct {
            verdict.push_reason(ReasonCode::AlreadyDirect);
        }
        if verdict.already_proxy {
            verdict.push_reason(ReasonCode::AlreadyProxy);
        }
        if verdict.already_geosite_cn {
            verdict.push_reason(ReasonCode::AlreadyGeositeCn);
        }

        let duplicate = match mode {
            ClassifyMode::Suggest => verdict.already_listed(),
            ClassifyMode::Request(RuleKind::Direct) => {
                verdict.already_direct || verdict.already_geosite_cn
            }
            ClassifyMode::Request(RuleKind::Proxy) => {
                verdict.already_proxy || verdict.already_geosite_cn
            }
        };
        if duplicate {
            verdict.details.push(format!("{} is already covered by an existing rule", domain));
            tracing::debug!(domain = %domain, "already listed, skipping resolution");
            return Ok(verdict);
        }

        self.gather_evidence(&mut verdict, index).await;

        let counts = SignalCounts::new(
            verdict.china_ip_count(),
            verdict.overseas_ip_count(),
            verdict.china_ns_count(),
        );

        match mode {
            ClassifyMode::Suggest => {
                verdict.recommendation = DecisionPolicy::suggest(&counts);
            }
            ClassifyMode::Request(kind) => {
                if !DecisionPolicy::allows(kind, &counts) {
                    tracing::info!(
                        domain = %domain,
                        kind = %kind,
                        china_ips = counts.china_ips,
                        overseas_ips = counts.overseas_ips,
                        china_ns = counts.china_ns,
                        "rule request rejected"
                    );
                    return Err(ClassifyError::AdditionNotEligible { domain: sld, kind });
                }
                verdict.recommendation = Recommendation::from(kind);
            }
        }
        push_decision_reasons(&mut verdict, &counts);

        tracing::info!(
            domain = %domain,
            recommendation = %verdict.recommendation,
            china_ips = counts.china_ips,
            overseas_ips = counts.overseas_ips,
            china_ns = counts.china_ns,
            "classified"
        );
        Ok(verdict)
    }

    /// Resolve and geolocate everything the policy looks at.
    async fn gather_evidence(&self, verdict: &mut ClassificationVerdict, index: &GeoIndex) {
        let domain = verdict.domain.clone();
        let sld = verdict.second_level_domain.clone();
        let resolve_sld = sld != domain;

        let (domain_ips, sld_ips, ns) = tokio::join!(
            self.resolver.resolve_ips(&domain),
            async {
                if resolve_sld {
                    Some(self.resolver.resolve_ips(&sld).await)
                } else {
                    None
                }
            },
            self.resolver.resolve_nameservers(&sld),
        );

        let mut degraded = domain_ips.failure_count() > 0 || ns.failure_count() > 0;

        // Address tally over the union of the domain and its second-level domain.
        let mut all_ips: BTreeSet<IpAddr> = BTreeSet::new();
        tally_ips(verdict, index, &domain_ips, &mut all_ips);
        if let Some(sld_ips) = &sld_ips {
            degraded |= sld_ips.failure_count() > 0;
            tally_ips(verdict, index, sld_ips, &mut all_ips);
        }
        if all_ips.is_empty() {
            verdict.push_reason(ReasonCode::NoIpResolved);
            verdict.details.push(format!("no IP address resolved for {}", domain));
        }
        verdict.resolved_ips = all_ips.into_iter().collect();

        if ns.nameservers.is_empty() {
            verdict.push_reason(ReasonCode::NoNameserverResolved);
            verdict.details.push(format!("no NS record resolved for {}", sld));
        } else {
            let hosts: Vec<String> = ns.nameservers.iter().cloned().collect();
            let host_results = join_all(hosts.iter().map(|h| self.resolver.resolve_ips(h))).await;

            let mut seen: BTreeSet<IpAddr> = BTreeSet::new();
            for (host, result) in hosts.iter().zip(host_results.iter()) {
                degraded |= result.failure_count() > 0;
                let mut per_host: BTreeMap<String, usize> = BTreeMap::new();
                for ip in &result.resolved_ips {
                    let key = country_key(index.lookup_country(*ip));
                    *per_host.entry(key.clone()).or_insert(0) += 1;
                    // hosts sharing an address count it once in the aggregate
                    if seen.insert(*ip) {
                        *verdict.ns_country_counts.entry(key).or_insert(0) += 1;
                    }
                }
                let china = per_host.get(CountryCode::CHINA.as_str()).copied().unwrap_or(0);
                let overseas: usize = per_host.values().sum::<usize>() - china;
                verdict.details.push(format!(
                    "NS {}: {} China IP(s), {} overseas IP(s)",
                    host, china, overseas
                ));
            }
            verdict.nameservers = hosts;
        }

        if degraded {
            verdict.push_reason(ReasonCode::ResolverDegraded);
        }
    }
}

/// Whether `domain` or any parent down to its second-level domain is in `rules`.
fn listed_in(rules: &HashSet<String>, domain: &str) -> bool {
    domain_name::suffixes_to_second_level(domain)
        .into_iter()
        .any(|suffix| rules.contains(suffix))
}

fn tally_ips(
    verdict: &mut ClassificationVerdict,
    index: &GeoIndex,
    result: &ResolutionResult,
    seen: &mut BTreeSet<IpAddr>,
) {
    for ip in &result.resolved_ips {
        if !seen.insert(*ip) {
            continue;
        }
        let key = country_key(index.lookup_country(*ip));
        verdict
            .details
            .push(format!("{} IP {}: {}", result.domain, ip, key));
        *verdict.ip_country_counts.entry(key).or_insert(0) += 1;
    }
}

fn push_decision_reasons(verdict: &mut ClassificationVerdict, counts: &SignalCounts) {
    match verdict.recommendation {
        Recommendation::Proxy => verdict.push_reason(ReasonCode::OverseasIpMajority),
        Recommendation::Direct => {
            if counts.china_ips > 0 {
                verdict.push_reason(ReasonCode::ChinaIpPresent);
            }
            if counts.china_ns > 0 {
                verdict.push_reason(ReasonCode::ChinaNameserver);
            }
        }
        Recommendation::None => verdict.push_reason(ReasonCode::NoChinaSignal),
    }
}
