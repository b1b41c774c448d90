//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Serialize, Serializer};
use std::fmt;

/// Key used in country tallies for addresses with no known country.
pub const UNKNOWN_COUNTRY: &str = "??";

/// ISO 3166-1 alpha-2 country code, stored uppercase.
///
/// Kept as two inline bytes so the range tables stay compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    /// Mainland China, the only country treated as "direct".
    pub const CHINA: CountryCode = CountryCode(*b"CN");

    /// Parse a two-letter country code (case-insensitive).
    ///
    /// # Examples
    /// ```
    /// use rule_advisor::domain::value_objects::CountryCode;
    ///
    /// assert_eq!(CountryCode::parse("cn"), Some(CountryCode::CHINA));
    /// assert_eq!(CountryCode::parse("CHN"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.trim().as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return None;
        }
        Some(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
        ]))
    }

    pub fn as_str(&self) -> &str {
        // only ever built from ASCII letters
        std::str::from_utf8(&self.0).unwrap_or(UNKNOWN_COUNTRY)
    }

    pub fn is_china(&self) -> bool {
        *self == Self::CHINA
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CountryCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Kind of routing rule a domain can be added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Direct,
    Proxy,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Proxy => "proxy",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the caller wants a domain evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyMode {
    /// Query page: suggest whichever rule kind the evidence supports.
    Suggest,
    /// Command entry: the caller asked for a specific rule kind.
    Request(RuleKind),
}

/// Final recommendation of a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Direct,
    Proxy,
    /// Not enough signal, or nothing to add.
    None,
}

impl From<RuleKind> for Recommendation {
    fn from(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Direct => Self::Direct,
            RuleKind::Proxy => Self::Proxy,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Proxy => f.write_str("proxy"),
            Self::None => f.write_str("none"),
        }
    }
}

/// Machine-readable tag explaining one step of a verdict.
///
/// Tags are appended to a verdict in the order the classifier reached them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    AlreadyDirect,
    AlreadyProxy,
    AlreadyGeositeCn,
    NoIpResolved,
    NoNameserverResolved,
    ResolverDegraded,
    OverseasIpMajority,
    ChinaIpPresent,
    ChinaNameserver,
    NoChinaSignal,
}

impl ReasonCode {
    /// Short human-readable explanation.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::AlreadyDirect => "already covered by a direct rule",
            Self::AlreadyProxy => "already covered by a proxy rule",
            Self::AlreadyGeositeCn => "already listed in GEOSITE:CN",
            Self::NoIpResolved => "no IP address could be resolved",
            Self::NoNameserverResolved => "no NS record could be resolved",
            Self::ResolverDegraded => "some DNS providers failed",
            Self::OverseasIpMajority => "overseas IPs outnumber China IPs",
            Self::ChinaIpPresent => "resolves to at least one China IP",
            Self::ChinaNameserver => "served by a nameserver located in China",
            Self::NoChinaSignal => "neither IPs nor nameservers point to China",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// DNS record types the resolver asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    A,
    Aaaa,
    Ns,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::Aaaa => f.write_str("AAAA"),
            Self::Ns => f.write_str("NS"),
        }
    }
}
