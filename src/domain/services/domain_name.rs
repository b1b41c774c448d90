//! Domain Name Service
//!
//! Pure functions for turning user input into a canonical hostname and
//! deriving the granularity rules are kept at.

use crate::domain::errors::ClassifyError;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Normalize user input into a lowercase hostname.
///
/// Accepts bare domains as well as URL forms such as
/// `https://user@sub.Example.com:8080/path?q=1#frag`. Scheme, userinfo,
/// port, path, query and fragment are dropped, as are a trailing dot and a
/// leading `www.` label.
///
/// # Examples
/// ```
/// use rule_advisor::domain::services::domain_name::normalize;
///
/// assert_eq!(normalize("https://sub.EXAMPLE.com:8080/path?q=1").unwrap(), "sub.example.com");
/// assert!(normalize("not a domain").is_err());
/// ```
pub fn normalize(raw: &str) -> Result<String, ClassifyError> {
    let trimmed = raw.trim();
    let invalid = || ClassifyError::InvalidDomain(trimmed.to_string());

    let mut rest = trimmed;
    if let Some(idx) = rest.find("://") {
        rest = &rest[idx + 3..];
    }

    let authority_end = rest
        .find(|c| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let mut host = &rest[..authority_end];

    if let Some(at) = host.rfind('@') {
        host = &host[at + 1..];
    }
    if let Some(colon) = host.find(':') {
        host = &host[..colon];
    }

    let mut domain = host
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '.' | ',' | ';'))
        .to_ascii_lowercase();

    if let Some(stripped) = domain.strip_prefix("www.") {
        if stripped.contains('.') {
            domain = stripped.to_string();
        }
    }

    if !is_valid_hostname(&domain) {
        return Err(invalid());
    }
    Ok(domain)
}

/// Lowercase a name and drop a trailing root dot, without validating it.
pub fn canonical(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Check that `domain` is a syntactically valid, fully qualified hostname.
///
/// Requires at least two labels and an alphabetic top-level label of two
/// or more characters.
pub fn is_valid_hostname(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    });

    let tld = labels[labels.len() - 1];
    labels_ok && tld.len() >= 2 && tld.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Registrable domain under the last-two-labels rule.
///
/// `a.b.example.com` becomes `example.com`. No public-suffix list is
/// consulted, so `a.example.co.uk` becomes `co.uk`.
pub fn second_level_domain(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() <= 2 {
        return domain.to_string();
    }
    labels[labels.len() - 2..].join(".")
}

/// Whether the top-level label is `cn`.
pub fn is_cn_domain(domain: &str) -> bool {
    domain
        .rsplit('.')
        .next()
        .map(|tld| tld.eq_ignore_ascii_case("cn"))
        .unwrap_or(false)
}

/// `domain` followed by each parent, stopping at the second-level domain.
///
/// `a.b.example.com` yields `a.b.example.com`, `b.example.com`, `example.com`.
pub fn suffixes_to_second_level(domain: &str) -> Vec<&str> {
    let label_count = domain.split('.').count();
    let mut out = Vec::with_capacity(label_count.saturating_sub(1));
    let mut rest = domain;
    out.push(rest);
    for _ in 2..label_count {
        match rest.find('.') {
            Some(dot) => {
                rest = &rest[dot + 1..];
                out.push(rest);
            }
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_domain() {
        assert_eq!(normalize("Example.COM").unwrap(), "example.com");
    }

    #[test]
    fn test_normalize_strips_url_parts() {
        let cases = vec![
            ("https://sub.EXAMPLE.com:8080/path?q=1", "sub.example.com"),
            ("http://example.com", "example.com"),
            ("ftp://files.example.org/pub/", "files.example.org"),
            ("example.com/path#frag", "example.com"),
            ("example.com?x=1", "example.com"),
            ("https://user:pw@api.example.com/", "api.example.com"),
            ("  example.com.  ", "example.com"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize(input).unwrap(), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_normalize_strips_www() {
        assert_eq!(normalize("www.example.com").unwrap(), "example.com");
        assert_eq!(normalize("https://WWW.example.com/").unwrap(), "example.com");
    }

    #[test]
    fn test_normalize_keeps_www_when_it_is_the_name() {
        assert_eq!(normalize("www.com").unwrap(), "www.com");
    }

    #[test]
    fn test_normalize_rejects_invalid() {
        for input in ["", "localhost", "exa mple.com", "-bad.com", "bad-.com", "example.c0m", "example.c", "a..b.com", "https:///path"] {
            assert!(
                matches!(normalize(input), Err(ClassifyError::InvalidDomain(_))),
                "input should be rejected: {:?}",
                input
            );
        }
    }

    #[test]
    fn test_normalize_rejects_ip_literal() {
        assert!(normalize("http://1.2.3.4/").is_err());
    }

    #[test]
    fn test_is_valid_hostname_length_limits() {
        let long_label = "a".repeat(64);
        assert!(!is_valid_hostname(&format!("{}.com", long_label)));
        let ok_label = "a".repeat(63);
        assert!(is_valid_hostname(&format!("{}.com", ok_label)));

        let long_domain = format!("{}.com", vec!["abc"; 70].join("."));
        assert!(long_domain.len() > MAX_DOMAIN_LEN);
        assert!(!is_valid_hostname(&long_domain));
    }

    #[test]
    fn test_second_level_domain() {
        assert_eq!(second_level_domain("a.b.example.com"), "example.com");
        assert_eq!(second_level_domain("example.com"), "example.com");
        assert_eq!(second_level_domain("a.example.co.uk"), "co.uk");
    }

    #[test]
    fn test_normalization_yields_same_second_level() {
        let a = normalize("https://sub.EXAMPLE.com:8080/path?q=1").unwrap();
        let b = normalize("sub.example.com").unwrap();
        assert_eq!(second_level_domain(&a), "example.com");
        assert_eq!(second_level_domain(&a), second_level_domain(&b));
    }

    #[test]
    fn test_is_cn_domain() {
        assert!(is_cn_domain("example.cn"));
        assert!(is_cn_domain("a.com.cn"));
        assert!(is_cn_domain("EXAMPLE.CN"));
        assert!(!is_cn_domain("cn.example.com"));
        assert!(!is_cn_domain("example.cnn"));
    }

    #[test]
    fn test_suffixes_to_second_level() {
        assert_eq!(
            suffixes_to_second_level("a.b.example.com"),
            vec!["a.b.example.com", "b.example.com", "example.com"]
        );
        assert_eq!(suffixes_to_second_level("example.com"), vec!["example.com"]);
    }

    #[test]
    fn test_canonical() {
        assert_eq!(canonical("Example.COM."), "example.com");
    }
}
