//! Geo Dataset Index
//!
//! Immutable lookup structures for IP-range→country and the GEOSITE:CN
//! domain list. An index is built once from raw dataset bytes and then
//! only read; a refresh builds a new one instead of mutating this one.

use crate::domain::entities::{GeoSiteEntry, IpRange};
use crate::domain::errors::RefreshError;
use crate::domain::services::domain_name::canonical;
use crate::domain::value_objects::CountryCode;
use ipnetwork::IpNetwork;
use std::collections::HashMap;
use std::net::IpAddr;

/// Category label of the direct list.
pub const CN_CATEGORY: &str = "CN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuffixMatch {
    /// Domain and all subdomains
    Suffix,
    /// Only the domain itself
    Exact,
}

/// Immutable snapshot of the geolocation datasets.
///
/// Range tables are sorted by start and non-overlapping, so a lookup is a
/// single binary search. Domain membership walks the input's own labels
/// from the right, so its cost depends on the label count, not on the
/// number of entries.
#[derive(Debug, Default)]
pub struct GeoIndex {
    v4: Vec<IpRange>,
    v6: Vec<IpRange>,
    sites: HashMap<String, (SuffixMatch, String)>,
}

/// Counts reported while parsing the geosite list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GeoSiteParseStats {
    pub entries: usize,
    pub skipped: usize,
}

impl GeoIndex {
    /// An index with no data. Every lookup answers "unknown".
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already parsed parts.
    ///
    /// Fails if any range has start > end, or if two ranges of the same
    /// family overlap.
    pub fn from_parts(
        ranges: Vec<(IpAddr, IpAddr, CountryCode)>,
        sites: Vec<GeoSiteEntry>,
    ) -> Result<Self, RefreshError> {
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();

        for (start, end, country) in ranges {
            match (start, end) {
                (IpAddr::V4(s), IpAddr::V4(e)) => {
                    v4.push(IpRange::new(u32::from(s) as u128, u32::from(e) as u128, country))
                }
                (IpAddr::V6(s), IpAddr::V6(e)) => {
                    v6.push(IpRange::new(u128::from(s), u128::from(e), country))
                }
                _ => {
                    return Err(RefreshError::ParseFailed(format!(
                        "range {}-{} mixes address families",
                        start, end
                    )))
                }
            }
        }

        let v4 = sort_and_check(v4, "IPv4")?;
        let v6 = sort_and_check(v6, "IPv6")?;

        let mut site_map = HashMap::with_capacity(sites.len());
        for entry in sites {
            let key = canonical(&entry.domain_suffix);
            if key.is_empty() {
                continue;
            }
            let kind = if entry.exact {
                SuffixMatch::Exact
            } else {
                SuffixMatch::Suffix
            };
            // a suffix entry already covers an exact one for the same name
            let covered = matches!(site_map.get(&key), Some((SuffixMatch::Suffix, _)));
            if !covered {
                site_map.insert(key, (kind, entry.category));
            }
        }

        Ok(Self {
            v4,
            v6,
            sites: site_map,
        })
    }

    /// Parse raw dataset bytes into a new index.
    pub fn build(ip_data: &[u8], geosite_data: &[u8]) -> Result<Self, RefreshError> {
        let ranges = parse_ip_ranges(ip_data)?;
        let (sites, stats) = parse_geosite_list(geosite_data, CN_CATEGORY)?;
        tracing::debug!(
            ranges = ranges.len(),
            geosite_entries = stats.entries,
            geosite_skipped = stats.skipped,
            "parsed geo datasets"
        );
        Self::from_parts(ranges, sites)
    }

    /// Country of the unique range containing `ip`, if any.
    pub fn lookup_country(&self, ip: IpAddr) -> Option<CountryCode> {
        let (table, value) = match ip {
            IpAddr::V4(v4) => (&self.v4, u32::from(v4) as u128),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => (&self.v4, u32::from(v4) as u128),
                None => (&self.v6, u128::from(v6)),
            },
        };

        // first range starting after `value`; the candidate is the one before it
        let idx = table.partition_point(|r| r.start <= value);
        if idx == 0 {
            return None;
        }
        let range = &table[idx - 1];
        range.contains(value).then_some(range.country)
    }

    /// Whether `domain` or any parent of it is on the GEOSITE:CN list.
    pub fn is_direct_listed(&self, domain: &str) -> bool {
        self.category_of(domain)
            .map(|c| c == CN_CATEGORY)
            .unwrap_or(false)
    }

    /// Category of the most specific entry matching `domain`.
    pub fn category_of(&self, domain: &str) -> Option<&str> {
        let domain = canonical(domain);
        if domain.is_empty() {
            return None;
        }

        if let Some((_, category)) = self.sites.get(domain.as_str()) {
            return Some(category.as_str());
        }

        let mut rest = domain.as_str();
        while let Some(dot) = rest.find('.') {
            rest = &rest[dot + 1..];
            if let Some((SuffixMatch::Suffix, category)) = self.sites.get(rest) {
                return Some(category.as_str());
            }
        }
        None
    }

    /// `(ip_range_count, geosite_count)`
    pub fn size(&self) -> (usize, usize) {
        (self.v4.len() + self.v6.len(), self.sites.len())
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty() && self.sites.is_empty()
    }
}

fn sort_and_check(mut ranges: Vec<IpRange>, family: &str) -> Result<Vec<IpRange>, RefreshError> {
    if let Some(bad) = ranges.iter().find(|r| r.start > r.end) {
        return Err(RefreshError::ParseFailed(format!(
            "{} range starts after it ends ({} > {})",
            family, bad.start, bad.end
        )));
    }

    ranges.sort_unstable_by_key(|r| r.start);

    for pair in ranges.windows(2) {
        if pair[1].start <= pair[0].end {
            return Err(RefreshError::ParseFailed(format!(
                "overlapping {} ranges ({} and {})",
                family, pair[0].country, pair[1].country
            )));
        }
    }
    Ok(ranges)
}

/// Parse the IP-range dataset.
///
/// One entry per line; `#` starts a comment. Fields are separated by commas
/// or whitespace:
///
/// ```text
/// 1.0.1.0/24,CN
/// 8.8.8.0-8.8.8.255 US
/// 2001:db8::,2001:db8::ffff,JP
/// ```
pub fn parse_ip_ranges(data: &[u8]) -> Result<Vec<(IpAddr, IpAddr, CountryCode)>, RefreshError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| RefreshError::ParseFailed(format!("ip ranges are not utf-8: {}", e)))?;

    let mut out = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();

        let bad_line = || {
            RefreshError::ParseFailed(format!("ip ranges line {}: {:?}", line_no + 1, raw_line))
        };

        let (start, end, country) = match fields.as_slice() {
            [network, country] if network.contains('/') => {
                let net: IpNetwork = network.parse().map_err(|_| bad_line())?;
                (net.network(), net.broadcast(), *country)
            }
            [span, country] => {
                let (s, e) = span.split_once('-').ok_or_else(bad_line)?;
                (
                    s.parse().map_err(|_| bad_line())?,
                    e.parse().map_err(|_| bad_line())?,
                    *country,
                )
            }
            [s, e, country] => (
                s.parse().map_err(|_| bad_line())?,
                e.parse().map_err(|_| bad_line())?,
                *country,
            ),
            _ => return Err(bad_line()),
        };

        let country = CountryCode::parse(country).ok_or_else(bad_line)?;
        out.push((start, end, country));
    }
    Ok(out)
}

/// Parse a v2ray-style domain list.
///
/// `domain:x` and bare `x` are suffix entries, `full:x` is exact. `regexp:`
/// and `keyword:` rules cannot be answered by suffix lookup and are skipped.
/// A trailing `@attr` tag is ignored.
pub fn parse_geosite_list(
    data: &[u8],
    category: &str,
) -> Result<(Vec<GeoSiteEntry>, GeoSiteParseStats), RefreshError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| RefreshError::ParseFailed(format!("geosite list is not utf-8: {}", e)))?;

    let mut entries = Vec::new();
    let mut stats = GeoSiteParseStats::default();

    for raw_line in text.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let line = line.split('@').next().unwrap_or("").trim();

        let entry = if let Some(d) = line.strip_prefix("full:") {
            GeoSiteEntry::exact(canonical(d), category)
        } else if let Some(d) = line.strip_prefix("domain:") {
            GeoSiteEntry::suffix(canonical(d), category)
        } else if line.starts_with("regexp:") || line.starts_with("keyword:") {
            stats.skipped += 1;
            continue;
        } else if line.contains(':') || line.contains(char::is_whitespace) {
            // include: and other directives
            stats.skipped += 1;
            continue;
        } else {
            GeoSiteEntry::suffix(canonical(line), category)
        };

        if entry.domain_suffix.is_empty() {
            stats.skipped += 1;
            continue;
        }
        entries.push(entry);
        stats.entries += 1;
    }

    Ok((entries, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn cc(s: &str) -> CountryCode {
        CountryCode::parse(s).unwrap()
    }

    fn sample_index() -> GeoIndex {
        let ranges = b"\
# sample
1.0.1.0/24,CN
8.8.8.0-8.8.8.255 US
114.114.114.0,114.114.114.255,CN
2001:db8::/32,JP
";
        let sites = b"\
# direct list
example.com
domain:baidu.com
full:exact.org
regexp:^ad\\.
keyword:taobao
qq.com @cn
";
        GeoIndex::build(ranges, sites).unwrap()
    }

    #[test]
    fn test_lookup_country_hits() {
        let index = sample_index();
        assert_eq!(index.lookup_country(ip("1.0.1.0")), Some(CountryCode::CHINA));
        assert_eq!(index.lookup_country(ip("1.0.1.255")), Some(CountryCode::CHINA));
        assert_eq!(index.lookup_country(ip("8.8.8.8")), Some(cc("US")));
        assert_eq!(index.lookup_country(ip("114.114.114.114")), Some(CountryCode::CHINA));
        assert_eq!(index.lookup_country(ip("2001:db8::1")), Some(cc("JP")));
    }

    #[test]
    fn test_lookup_country_misses() {
        let index = sample_index();
        assert_eq!(index.lookup_country(ip("0.0.0.0")), None);
        assert_eq!(index.lookup_country(ip("1.0.2.0")), None);
        assert_eq!(index.lookup_country(ip("8.8.7.255")), None);
        assert_eq!(index.lookup_country(ip("255.255.255.255")), None);
        assert_eq!(index.lookup_country(ip("2001:db9::1")), None);
    }

    #[test]
    fn test_lookup_country_ipv4_mapped_v6() {
        let index = sample_index();
        let mapped = IpAddr::V6(Ipv4Addr::new(8, 8, 8, 8).to_ipv6_mapped());
        assert_eq!(index.lookup_country(mapped), Some(cc("US")));
    }

    #[test]
    fn test_lookup_matches_linear_scan() {
        // Tiled ranges with gaps; compare binary search with a brute-force scan.
        let mut ranges = Vec::new();
        let mut start: u32 = 1000;
        for i in 0..200u32 {
            let len = (i * 37) % 50 + 1;
            let country = if i % 3 == 0 { "CN" } else { "US" };
            ranges.push((
                IpAddr::V4(Ipv4Addr::from(start)),
                IpAddr::V4(Ipv4Addr::from(start + len)),
                cc(country),
            ));
            start += len + 1 + (i % 4);
        }
        let index = GeoIndex::from_parts(ranges.clone(), Vec::new()).unwrap();

        for probe in 900u32..start + 100 {
            let addr = IpAddr::V4(Ipv4Addr::from(probe));
            let expected = ranges
                .iter()
                .find(|(s, e, _)| {
                    let (IpAddr::V4(s), IpAddr::V4(e)) = (s, e) else { unreachable!() };
                    u32::from(*s) <= probe && probe <= u32::from(*e)
                })
                .map(|(_, _, c)| *c);
            assert_eq!(index.lookup_country(addr), expected, "probe {}", probe);
        }
    }

    #[test]
    fn test_overlapping_ranges_rejected() {
        let data = b"1.0.0.0/16,CN\n1.0.5.0/24,US\n";
        let err = GeoIndex::build(data, b"").unwrap_err();
        assert!(matches!(err, RefreshError::ParseFailed(_)));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let data = b"1.0.0.10-1.0.0.1,CN\n";
        assert!(matches!(
            GeoIndex::build(data, b""),
            Err(RefreshError::ParseFailed(_))
        ));
    }

    #[test]
    fn test_mixed_family_range_rejected() {
        let ranges = vec![(ip("1.0.0.0"), IpAddr::V6(Ipv6Addr::LOCALHOST), CountryCode::CHINA)];
        assert!(GeoIndex::from_parts(ranges, Vec::new()).is_err());
    }

    #[test]
    fn test_malformed_ip_line_rejected() {
        for data in [&b"not-an-ip,CN\n"[..], b"1.0.0.0/24\n", b"1.0.0.0/24,CHINA\n", b"1.0.0.0/99,CN\n"] {
            assert!(
                matches!(GeoIndex::build(data, b""), Err(RefreshError::ParseFailed(_))),
                "{:?}",
                String::from_utf8_lossy(data)
            );
        }
    }

    #[test]
    fn test_non_utf8_rejected() {
        assert!(GeoIndex::build(&[0xff, 0xfe], b"").is_err());
        assert!(GeoIndex::build(b"", &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_adjacent_ranges_allowed() {
        let data = b"1.0.0.0-1.0.0.255,CN\n1.0.1.0-1.0.1.255,US\n";
        let index = GeoIndex::build(data, b"").unwrap();
        assert_eq!(index.lookup_country(ip("1.0.0.255")), Some(CountryCode::CHINA));
        assert_eq!(index.lookup_country(ip("1.0.1.0")), Some(cc("US")));
    }

    #[test]
    fn test_is_direct_listed_right_anchored() {
        let index = sample_index();
        assert!(index.is_direct_listed("example.com"));
        assert!(index.is_direct_listed("x.example.com"));
        assert!(index.is_direct_listed("a.b.example.com"));
        assert!(!index.is_direct_listed("notexample.com"));
        assert!(!index.is_direct_listed("example.com.evil.net"));
        assert!(!index.is_direct_listed("com"));
    }

    #[test]
    fn test_is_direct_listed_normalizes_input() {
        let index = sample_index();
        assert!(index.is_direct_listed("WWW.Baidu.COM."));
        assert!(index.is_direct_listed("mail.qq.com"));
    }

    #[test]
    fn test_full_entries_are_exact() {
        let index = sample_index();
        assert!(index.is_direct_listed("exact.org"));
        assert!(!index.is_direct_listed("sub.exact.org"));
    }

    #[test]
    fn test_regexp_and_keyword_skipped() {
        let (entries, stats) = parse_geosite_list(
            b"regexp:^ad\\.\nkeyword:taobao\ninclude:foo\nbaidu.com\n",
            CN_CATEGORY,
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(stats, GeoSiteParseStats { entries: 1, skipped: 3 });
    }

    #[test]
    fn test_suffix_entry_wins_over_exact_duplicate() {
        let index = GeoIndex::build(b"", b"full:example.com\nexample.com\nfull:example.com\n").unwrap();
        assert!(index.is_direct_listed("sub.example.com"));
        assert_eq!(index.size(), (0, 1));
    }

    #[test]
    fn test_category_of_other_category() {
        let sites = vec![GeoSiteEntry::suffix("google.com", "GOOGLE")];
        let index = GeoIndex::from_parts(Vec::new(), sites).unwrap();
        assert_eq!(index.category_of("mail.google.com"), Some("GOOGLE"));
        assert!(!index.is_direct_listed("mail.google.com"));
    }

    #[test]
    fn test_size_and_empty() {
        let index = sample_index();
        assert_eq!(index.size(), (4, 4));
        assert!(!index.is_empty());

        let empty = GeoIndex::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.size(), (0, 0));
        assert_eq!(empty.lookup_country(ip("1.1.1.1")), None);
        assert!(!empty.is_direct_listed("example.com"));
    }
}
