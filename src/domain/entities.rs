//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of rule classification.
//! They have no external dependencies and contain only business logic.

use crate::domain::errors::DnsError;
use crate::domain::value_objects::{
    CountryCode, ReasonCode, Recommendation, UNKNOWN_COUNTRY,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

/// Contiguous block of addresses assigned to one country.
///
/// Both bounds are inclusive. IPv4 addresses are stored widened to `u128`;
/// the two families are never mixed in one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    pub start: u128,
    pub end: u128,
    pub country: CountryCode,
}

impl IpRange {
    pub fn new(start: u128, end: u128, country: CountryCode) -> Self {
        Self {
            start,
            end,
            country,
        }
    }

    pub fn contains(&self, value: u128) -> bool {
        self.start <= value && value <= self.end
    }
}

/// One line of a geosite list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeoSiteEntry {
    /// Lowercase domain without trailing dot
    pub domain_suffix: String,
    /// Opaque category label ("CN" for the direct list)
    pub category: String,
    /// When true only the domain itself matches, not its subdomains
    pub exact: bool,
}

impl GeoSiteEntry {
    pub fn suffix(domain_suffix: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            domain_suffix: domain_suffix.into(),
            category: category.into(),
            exact: false,
        }
    }

    pub fn exact(domain: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            domain_suffix: domain.into(),
            category: category.into(),
            exact: true,
        }
    }
}

/// A single record pulled out of a DNS answer section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsAnswer {
    Address(IpAddr),
    Nameserver(String),
}

/// Outcome of resolving one domain across the configured providers.
///
/// `provider_errors` has one entry per provider that was asked:
/// `None` for success, `Some(err)` for failure.
#[derive(Debug, Clone, Default)]
pub struct ResolutionResult {
    pub domain: String,
    pub resolved_ips: BTreeSet<IpAddr>,
    pub nameservers: BTreeSet<String>,
    pub provider_errors: BTreeMap<String, Option<DnsError>>,
}

impl ResolutionResult {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    /// Number of providers that returned an error.
    pub fn failure_count(&self) -> usize {
        self.provider_errors.values().filter(|e| e.is_some()).count()
    }

    /// True when providers were asked and every one of them failed.
    pub fn all_failed(&self) -> bool {
        !self.provider_errors.is_empty() && self.failure_count() == self.provider_errors.len()
    }
}

/// Result of classifying one domain.
///
/// Produced once per request and handed to the caller; the classifier keeps
/// no reference to it.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationVerdict {
    pub domain: String,
    pub second_level_domain: String,
    pub already_direct: bool,
    pub already_proxy: bool,
    pub already_geosite_cn: bool,
    pub ip_country_counts: BTreeMap<String, usize>,
    pub ns_country_counts: BTreeMap<String, usize>,
    pub resolved_ips: Vec<IpAddr>,
    pub nameservers: Vec<String>,
    pub recommendation: Recommendation,
    pub reason_codes: Vec<ReasonCode>,
    /// Human-readable notes, one per observation
    pub details: Vec<String>,
}

impl ClassificationVerdict {
    pub fn new(domain: impl Into<String>, second_level_domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            second_level_domain: second_level_domain.into(),
            already_direct: false,
            already_proxy: false,
            already_geosite_cn: false,
            ip_country_counts: BTreeMap::new(),
            ns_country_counts: BTreeMap::new(),
            resolved_ips: Vec::new(),
            nameservers: Vec::new(),
            recommendation: Recommendation::None,
            reason_codes: Vec::new(),
            details: Vec::new(),
        }
    }

    pub fn china_ip_count(&self) -> usize {
        china_count(&self.ip_country_counts)
    }

    /// Every non-China address, including ones with unknown location.
    pub fn overseas_ip_count(&self) -> usize {
        overseas_count(&self.ip_country_counts)
    }

    pub fn china_ns_count(&self) -> usize {
        china_count(&self.ns_country_counts)
    }

    /// Whether the domain was already covered by some rule set.
    pub fn already_listed(&self) -> bool {
        self.already_direct || self.already_proxy || self.already_geosite_cn
    }

    /// One-paragraph explanation built from the reason codes.
    pub fn rationale(&self) -> String {
        let reasons: Vec<&str> = self.reason_codes.iter().map(|r| r.describe()).collect();
        if reasons.is_empty() {
            format!("{}: recommendation {}", self.second_level_domain, self.recommendation)
        } else {
            format!(
                "{}: recommendation {} ({})",
                self.second_level_domain,
                self.recommendation,
                reasons.join("; ")
            )
        }
    }

    pub(crate) fn push_reason(&mut self, reason: ReasonCode) {
        if !self.reason_codes.contains(&reason) {
            self.reason_codes.push(reason);
        }
    }
}

/// Tally key for a possibly unknown country.
pub fn country_key(country: Option<CountryCode>) -> String {
    country
        .map(|c| c.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
}

fn china_count(counts: &BTreeMap<String, usize>) -> usize {
    counts
        .get(CountryCode::CHINA.as_str())
        .copied()
        .unwrap_or(0)
}

fn overseas_count(counts: &BTreeMap<String, usize>) -> usize {
    counts
        .iter()
        .filter(|(k, _)| k.as_str() != CountryCode::CHINA.as_str())
        .map(|(_, v)| *v)
        .sum()
}
