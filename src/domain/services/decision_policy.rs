//! Decision Policy Service
//!
//! Pure domain logic turning geolocation tallies into a recommendation.
//! This service has NO external dependencies - it's pure Rust.

use crate::domain::value_objects::{Recommendation, RuleKind};

/// The three numbers the policy looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalCounts {
    pub china_ips: usize,
    /// Non-China addresses, unknown locations included
    pub overseas_ips: usize,
    /// Nameserver addresses located in China
    pub china_ns: usize,
}

impl SignalCounts {
    pub fn new(china_ips: usize, overseas_ips: usize, china_ns: usize) -> Self {
        Self {
            china_ips,
            overseas_ips,
            china_ns,
        }
    }
}

/// Direct-vs-proxy decision policy.
///
/// The two predicates are not symmetric. Proxy requires a strict IP
/// majority; Direct accepts any positive China signal from IPs or NS.
/// Branch order matters: Proxy is checked first.
pub struct DecisionPolicy;

impl DecisionPolicy {
    /// Overseas addresses strictly outnumber China addresses.
    pub fn proxy_eligible(counts: &SignalCounts) -> bool {
        counts.overseas_ips > counts.china_ips
    }

    /// At least one China address, or a nameserver located in China.
    pub fn direct_eligible(counts: &SignalCounts) -> bool {
        counts.china_ips > 0 || counts.china_ns > 0
    }

    /// Query-page suggestion: first matching branch wins.
    ///
    /// # Example
    /// ```
    /// use rule_advisor::domain::services::{DecisionPolicy, SignalCounts};
    /// use rule_advisor::domain::value_objects::Recommendation;
    ///
    /// let counts = SignalCounts::new(1, 3, 0);
    /// assert_eq!(DecisionPolicy::suggest(&counts), Recommendation::Proxy);
    /// ```
    pub fn suggest(counts: &SignalCounts) -> Recommendation {
        if Self::proxy_eligible(counts) {
            Recommendation::Proxy
        } else if Self::direct_eligible(counts) {
            Recommendation::Direct
        } else {
            Recommendation::None
        }
    }

    /// Command-entry check: only the requested branch's predicate applies.
    pub fn allows(kind: RuleKind, counts: &SignalCounts) -> bool {
        match kind {
            RuleKind::Direct => Self::direct_eligible(counts),
            RuleKind::Proxy => Self::proxy_eligible(counts),
        }
    }
}
