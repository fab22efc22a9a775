// src/discovery/subdomain.rs
use url::Url;

/// Where a URL's host sits relative to the base domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostClass {
    /// The bare base domain.
    Root,
    /// `<sub>.<base>`; `sub` may itself contain dots.
    Subdomain(String),
    /// A parsable URL whose host lives outside the base domain.
    Foreign(String),
    /// Unparsable URL, or one without a host.
    Invalid,
}

pub fn classify_host(url: &str, base_domain: &str) -> HostClass {
    let parsed = match Url::parse(url.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return HostClass::Invalid,
    };
    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host.trim_end_matches('.').to_ascii_lowercase(),
        _ => return HostClass::Invalid,
    };
    let base = base_domain.trim_matches('.').to_ascii_lowercase();

    if host == base {
        return HostClass::Root;
    }

    match host.strip_suffix(&base).and_then(|rest| rest.strip_suffix('.')) {
        Some(sub) if !sub.is_empty() => HostClass::Subdomain(sub.to_string()),
        _ => HostClass::Foreign(host),
    }
}

/// Returns the subdomain of `url` under `base_domain`.
///
/// The root domain, foreign hosts and unparsable input all map to the empty
/// string. Never panics.
pub fn extract_subdomain(url: &str, base_domain: &str) -> String {
    match classify_host(url, base_domain) {
        HostClass::Subdomain(sub) => sub,
        HostClass::Root | HostClass::Foreign(_) | HostClass::Invalid => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BASE: &str = "ubq.fi";

    #[test]
    fn root_domain_is_empty() {
        assert_eq!(extract_subdomain("https://ubq.fi", BASE), "");
        assert_eq!(extract_subdomain("https://ubq.fi/some/path?q=1", BASE), "");
        assert_eq!(classify_host("https://ubq.fi", BASE), HostClass::Root);
    }

    #[test]
    fn single_and_multi_level_subdomains() {
        assert_eq!(extract_subdomain("https://pay.ubq.fi", BASE), "pay");
        assert_eq!(extract_subdomain("https://beta.pay.ubq.fi/x", BASE), "beta.pay");
        assert_eq!(extract_subdomain("https://PAY.UBQ.FI", BASE), "pay");
    }

    #[test]
    fn foreign_and_lookalike_hosts() {
        assert_eq!(extract_subdomain("https://example.com", BASE), "");
        assert_eq!(extract_subdomain("https://notubq.fi", BASE), "");
        assert_eq!(
            classify_host("https://notubq.fi", BASE),
            HostClass::Foreign("notubq.fi".to_string())
        );
    }

    #[test]
    fn malformed_input() {
        assert_eq!(extract_subdomain("", BASE), "");
        assert_eq!(extract_subdomain("not a url", BASE), "");
        assert_eq!(extract_subdomain("https://", BASE), "");
        assert_eq!(classify_host("mailto:ops@ubq.fi", BASE), HostClass::Invalid);
    }

    proptest! {
        #[test]
        fn never_panics_on_arbitrary_input(input in ".*") {
            let _ = extract_subdomain(&input, BASE);
        }

        #[test]
        fn label_before_base_is_returned(label in "[a-z][a-z0-9]{0,20}(\\.[a-z][a-z0-9]{0,20}){0,2}") {
            let url = format!("https://{}.{}/", label, BASE);
            prop_assert_eq!(extract_subdomain(&url, BASE), label);
        }
    }
}
