//! File Rule Store
//!
//! Implements RuleStore over Clash-style rule list files on disk.

use crate::domain::ports::RuleStore;
use crate::domain::services::domain_name;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Rule lists read from disk on every call, so external edits are picked
/// up without a restart.
///
/// Recognized lines are `DOMAIN-SUFFIX,example.com` and `DOMAIN,example.com`,
/// optionally followed by more comma-separated fields and optionally in
/// YAML list form (`- DOMAIN-SUFFIX,example.com`). `#` starts a comment.
pub struct FileRuleStore {
    direct_path: PathBuf,
    proxy_path: Option<PathBuf>,
}

impl FileRuleStore {
    pub fn new(direct_path: impl Into<PathBuf>, proxy_path: Option<PathBuf>) -> Self {
        Self {
            direct_path: direct_path.into(),
            proxy_path,
        }
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn list_direct_domains(&self) -> HashSet<String> {
        read_rule_file(&self.direct_path).await
    }

    async fn list_proxy_domains(&self) -> Option<HashSet<String>> {
        match &self.proxy_path {
            Some(path) => Some(read_rule_file(path).await),
            None => None,
        }
    }
}

async fn read_rule_file(path: &Path) -> HashSet<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => parse_rule_list(&content),
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to read rule file: {}", e);
            HashSet::new()
        }
    }
}

/// Extract the domains of all domain rules in `content`.
pub fn parse_rule_list(content: &str) -> HashSet<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.split('#').next().unwrap_or("").trim();
            let line = line.strip_prefix('-').map(str::trim).unwrap_or(line);
            let line = line.trim_matches(|c| c == '\'' || c == '"');

            let mut fields = line.split(',').map(str::trim);
            let rule_type = fields.next()?;
            if !rule_type.eq_ignore_ascii_case("DOMAIN-SUFFIX") && !rule_type.eq_ignore_ascii_case("DOMAIN") {
                return None;
            }

            let domain = domain_name::canonical(fields.next()?);
            (!domain.is_empty()).then_some(domain)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_rules(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_rule_list() {
        let content = "\
# direct rules
DOMAIN-SUFFIX,Example.com
DOMAIN,api.example.org
domain-suffix,lower.net,DIRECT
IP-CIDR,1.0.1.0/24
DOMAIN-KEYWORD,google
  - DOMAIN-SUFFIX,yaml.example.com
  - 'DOMAIN-SUFFIX,quoted.example.com'
DOMAIN-SUFFIX,trailing.example.com # comment

DOMAIN-SUFFIX,
";
        let rules = parse_rule_list(content);
        let mut sorted: Vec<&str> = rules.iter().map(String::as_str).collect();
        sorted.sort();
        assert_eq!(
            sorted,
            vec![
                "api.example.org",
                "example.com",
                "lower.net",
                "quoted.example.com",
                "trailing.example.com",
                "yaml.example.com",
            ]
        );
    }

    #[tokio::test]
    async fn test_file_rule_store_reads_both_lists() {
        let direct = write_rules("DOMAIN-SUFFIX,bilibili.com\nDOMAIN-SUFFIX,qq.com\n");
        let proxy = write_rules("DOMAIN-SUFFIX,google.com\n");
        let store = FileRuleStore::new(direct.path(), Some(proxy.path().to_path_buf()));

        let direct_rules = store.list_direct_domains().await;
        assert_eq!(direct_rules.len(), 2);
        assert!(direct_rules.contains("qq.com"));

        let proxy_rules = store.list_proxy_domains().await.unwrap();
        assert!(proxy_rules.contains("google.com"));
    }

    #[tokio::test]
    async fn test_file_rule_store_without_proxy_list() {
        let direct = write_rules("DOMAIN-SUFFIX,qq.com\n");
        let store = FileRuleStore::new(direct.path(), None);
        assert!(store.list_proxy_domains().await.is_none());
    }

    #[tokio::test]
    async fn test_file_rule_store_picks_up_edits() {
        let mut direct = write_rules("DOMAIN-SUFFIX,qq.com\n");
        let store = FileRuleStore::new(direct.path(), None);
        assert_eq!(store.list_direct_domains().await.len(), 1);

        direct.write_all(b"DOMAIN-SUFFIX,163.com\n").unwrap();
        direct.flush().unwrap();
        assert_eq!(store.list_direct_domains().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRuleStore::new(dir.path().join("missing.list"), None);
        assert!(store.list_direct_domains().await.is_empty());
    }
}
