use anyhow::Context;
use ipnetwork::{IpNetwork, Ipv4Network};
use std::net::Ipv4Addr;

/// One named DoH endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DohServer {
    pub name: String,
    pub url: String,
}

impl DohServer {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Dataset settings
    pub geoip_url: String,
    pub geosite_url: String,
    pub refresh_secs: u64,

    // Resolver settings
    pub doh_servers: Vec<DohServer>,
    pub ns_doh_servers: Vec<DohServer>,
    pub dns_timeout_secs: u64,
    pub client_subnet: IpNetwork,

    // Rule lists
    pub direct_rule_file: String,
    pub proxy_rule_file: Option<String>,

    pub debug: bool,
}

pub const DEFAULT_GEOIP_URL: &str =
    "https://raw.githubusercontent.com/sapics/ip-location-db/main/geo-whois-asn-country/geo-whois-asn-country-ipv4.csv";
pub const DEFAULT_GEOSITE_URL: &str =
    "https://raw.githubusercontent.com/Loyalsoldier/v2ray-rules-dat/refs/heads/release/direct-list.txt";

fn default_doh_servers() -> Vec<DohServer> {
    vec![
        DohServer::new("alibaba", "https://dns.alidns.com/dns-query"),
        DohServer::new("tencent", "https://doh.pub/dns-query"),
        DohServer::new("cloudflare", "https://1.1.1.1/dns-query"),
    ]
}

fn default_ns_doh_servers() -> Vec<DohServer> {
    vec![
        DohServer::new("cloudflare", "https://1.1.1.1/dns-query"),
        DohServer::new("google", "https://8.8.8.8/dns-query"),
        DohServer::new("quad9", "https://9.9.9.9/dns-query"),
    ]
}

fn default_client_subnet() -> IpNetwork {
    let net = Ipv4Network::new(Ipv4Addr::new(219, 0, 0, 0), 24).expect("/24 is a valid IPv4 prefix");
    IpNetwork::V4(net)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geoip_url: DEFAULT_GEOIP_URL.to_string(),
            geosite_url: DEFAULT_GEOSITE_URL.to_string(),
            refresh_secs: 21600,
            doh_servers: default_doh_servers(),
            ns_doh_servers: default_ns_doh_servers(),
            dns_timeout_secs: 5,
            client_subnet: default_client_subnet(),
            direct_rule_file: "direct.list".to_string(),
            proxy_rule_file: None,
            debug: false,
        }
    }
}

/// Load configuration from `RULE_ADVISOR_*` environment variables.
pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Load configuration through `lookup`, which maps a variable name to its value.
pub fn load_config_from<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();
    let var = |name: &str| lookup(&format!("RULE_ADVISOR_{}", name));

    let geoip_url = var("GEOIP_URL").unwrap_or(defaults.geoip_url);
    let geosite_url = var("GEOSITE_URL").unwrap_or(defaults.geosite_url);

    let refresh_secs = var("REFRESH_SECS")
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(defaults.refresh_secs);

    // Resolver settings
    let doh_servers = match var("DOH_SERVERS") {
        Some(v) => parse_servers(&v).context("RULE_ADVISOR_DOH_SERVERS")?,
        None => defaults.doh_servers,
    };

    let ns_doh_servers = match var("NS_DOH_SERVERS") {
        Some(v) => parse_servers(&v).context("RULE_ADVISOR_NS_DOH_SERVERS")?,
        None => defaults.ns_doh_servers,
    };

    let dns_timeout_secs = var("DNS_TIMEOUT_SECS")
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(defaults.dns_timeout_secs);

    let client_subnet = match var("CLIENT_SUBNET") {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("invalid RULE_ADVISOR_CLIENT_SUBNET {:?}", v))?,
        None => defaults.client_subnet,
    };

    // Rule lists
    let direct_rule_file = var("DIRECT_RULE_FILE").unwrap_or(defaults.direct_rule_file);
    let proxy_rule_file = var("PROXY_RULE_FILE").filter(|v| !v.trim().is_empty());

    let debug = lookup("DEBUG").is_some();

    Ok(Config {
        geoip_url,
        geosite_url,
        refresh_secs,
        doh_servers,
        ns_doh_servers,
        dns_timeout_secs,
        client_subnet,
        direct_rule_file,
        proxy_rule_file,
        debug,
    })
}

/// Parse `name=url,name=url`.
fn parse_servers(value: &str) -> anyhow::Result<Vec<DohServer>> {
    let servers = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, url) = entry
                .split_once('=')
                .with_context(|| format!("expected name=url, got {:?}", entry))?;
            let (name, url) = (name.trim(), url.trim());
            anyhow::ensure!(!name.is_empty() && !url.is_empty(), "empty name or url in {:?}", entry);
            Ok(DohServer::new(name, url))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    anyhow::ensure!(!servers.is_empty(), "no servers configured");
    Ok(servers)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_config_from(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.refresh_secs, 21600);
        assert_eq!(cfg.dns_timeout_secs, 5);
        assert_eq!(cfg.client_subnet.to_string(), "219.0.0.0/24");
        assert_eq!(cfg.doh_servers.len(), 3);
        assert_eq!(cfg.doh_servers[0].name, "alibaba");
        assert_eq!(cfg.ns_doh_servers[2].url, "https://9.9.9.9/dns-query");
        assert!(cfg.proxy_rule_file.is_none());
        assert!(!cfg.debug);
    }

    #[test]
    fn test_load_config_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.geoip_url, DEFAULT_GEOIP_URL);
        assert_eq!(cfg.geosite_url, DEFAULT_GEOSITE_URL);
        assert_eq!(cfg.direct_rule_file, "direct.list");
        assert_eq!(cfg.doh_servers, default_doh_servers());
    }

    #[test]
    fn test_load_config_with_custom_values() {
        let cfg = load(&[
            ("RULE_ADVISOR_GEOIP_URL", "http://mirror/ip.csv"),
            ("RULE_ADVISOR_REFRESH_SECS", "600"),
            ("RULE_ADVISOR_DNS_TIMEOUT_SECS", "2"),
            ("RULE_ADVISOR_CLIENT_SUBNET", "114.114.114.0/24"),
            ("RULE_ADVISOR_DIRECT_RULE_FILE", "/etc/rules/direct.list"),
            ("RULE_ADVISOR_PROXY_RULE_FILE", "/etc/rules/proxy.list"),
        ])
        .unwrap();

        assert_eq!(cfg.geoip_url, "http://mirror/ip.csv");
        assert_eq!(cfg.refresh_secs, 600);
        assert_eq!(cfg.dns_timeout_secs, 2);
        assert_eq!(cfg.client_subnet.to_string(), "114.114.114.0/24");
        assert_eq!(cfg.direct_rule_file, "/etc/rules/direct.list");
        assert_eq!(cfg.proxy_rule_file.as_deref(), Some("/etc/rules/proxy.list"));
    }

    #[test]
    fn test_load_config_with_servers() {
        let cfg = load(&[
            ("RULE_ADVISOR_DOH_SERVERS", "a=https://a/dns-query, b=https://b/dns-query"),
            ("RULE_ADVISOR_NS_DOH_SERVERS", "only=https://ns/dns-query"),
        ])
        .unwrap();

        assert_eq!(
            cfg.doh_servers,
            vec![
                DohServer::new("a", "https://a/dns-query"),
                DohServer::new("b", "https://b/dns-query"),
            ]
        );
        assert_eq!(cfg.ns_doh_servers.len(), 1);
    }

    #[test]
    fn test_load_config_rejects_malformed_servers() {
        assert!(load(&[("RULE_ADVISOR_DOH_SERVERS", "https://no-name")]).is_err());
        assert!(load(&[("RULE_ADVISOR_NS_DOH_SERVERS", " , ")]).is_err());
        assert!(load(&[("RULE_ADVISOR_DOH_SERVERS", "a=")]).is_err());
    }

    #[test]
    fn test_load_config_rejects_bad_subnet() {
        let err = load(&[("RULE_ADVISOR_CLIENT_SUBNET", "not-a-subnet")]).unwrap_err();
        assert!(err.to_string().contains("CLIENT_SUBNET"));
    }

    #[test]
    fn test_load_config_parse_error_uses_default() {
        let cfg = load(&[
            ("RULE_ADVISOR_REFRESH_SECS", "soon"),
            ("RULE_ADVISOR_DNS_TIMEOUT_SECS", "0"),
        ])
        .unwrap();
        assert_eq!(cfg.refresh_secs, 21600);
        assert_eq!(cfg.dns_timeout_secs, 5);
    }

    #[test]
    fn test_load_config_empty_proxy_file_is_none() {
        let cfg = load(&[("RULE_ADVISOR_PROXY_RULE_FILE", "  ")]).unwrap();
        assert!(cfg.proxy_rule_file.is_none());
    }

    #[test]
    fn test_load_config_with_debug() {
        let cfg = load(&[("DEBUG", "1")]).unwrap();
        assert!(cfg.debug);
    }

    #[test]
    fn test_config_clone() {
        let cfg = Config::default();
        let cloned = cfg.clone();
        assert_eq!(cfg.geoip_url, cloned.geoip_url);
        assert_eq!(cfg.client_subnet, cloned.client_subnet);
    }
}
