//! URL identity: parsing untrusted image URLs and normalizing them into
//! [`ImageKey`]s.
//!
//! Producers hand us the same asset under different spellings (host case,
//! tracking parameters, fragments, `http` vs `https`, protocol-relative
//! links). Everything that decides "same image?" goes through
//! [`normalize_url`].

use url::Url;

use crate::config::QueryPolicy;
use crate::domain::{ImageKey, UrlError};

/// A parsed image URL: the fetchable form plus its identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    pub parsed: Url,
    /// Fragment stripped; safe to download.
    pub fetch_url: String,
    pub key: ImageKey,
}

impl NormalizedUrl {
    /// Lowercased host with any leading `www.` removed.
    pub fn domain(&self) -> Option<String> {
        domain_of(&self.parsed)
    }
}

/// Parse an http(s) URL, upgrading protocol-relative links to https.
pub fn parse_image_url(raw: &str) -> Result<Url, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let candidate = if trimmed.starts_with("//") {
        format!("https:{trimmed}")
    } else {
        trimmed.to_string()
    };

    let url = Url::parse(&candidate).map_err(|e| UrlError::Unparseable {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(UrlError::UnsupportedScheme {
                url: truncate(trimmed, 80),
                scheme: other.to_string(),
            })
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost(trimmed.to_string()));
    }

    Ok(url)
}

/// Parse and normalize `raw` under `policy`.
///
/// The key folds scheme (`http` and `https` collapse), host and path case,
/// drops default ports, fragments and trailing slashes, and applies the query
/// policy.
pub fn normalize_url(raw: &str, policy: QueryPolicy) -> Result<NormalizedUrl, UrlError> {
    let parsed = parse_image_url(raw)?;

    let mut fetchable = parsed.clone();
    fetchable.set_fragment(None);

    let host = parsed
        .host_str()
        .ok_or_else(|| UrlError::MissingHost(raw.to_string()))?
        .to_ascii_lowercase();

    let mut key = String::with_capacity(raw.len());
    key.push_str("https://");
    key.push_str(&host);
    if let Some(port) = parsed.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }

    let path = parsed.path().to_lowercase();
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        ""
    };
    key.push_str(path);

    if policy == QueryPolicy::Sort {
        let mut pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(name, _)| !is_tracking_param(name))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        if !pairs.is_empty() {
            pairs.sort();
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (name, value) in &pairs {
                serializer.append_pair(name, value);
            }
            key.push('?');
            key.push_str(&serializer.finish());
        }
    }

    Ok(NormalizedUrl {
        parsed,
        fetch_url: fetchable.to_string(),
        key: ImageKey::new(key),
    })
}

/// Lowercased host without a leading `www.`.
pub fn domain_of(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Domain of a raw page URL, tolerating junk input.
pub fn domain_of_str(raw: &str) -> Option<String> {
    parse_image_url(raw).ok().as_ref().and_then(domain_of)
}

/// True when `host` is `domain` or one of its subdomains.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches("www.").to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    let host = host.to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .map_or(false, |prefix| prefix.ends_with('.'))
}

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "utm"
        || name.starts_with("utm_")
        || name.starts_with("mc_")
        || matches!(name.as_str(), "fbclid" | "gclid" | "dclid" | "msclkid" | "ref" | "ref_src")
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str, policy: QueryPolicy) -> String {
        normalize_url(raw, policy).unwrap().key.as_str().to_string()
    }

    #[test]
    fn test_case_query_and_fragment_collapse() {
        let a = key("https://cdn/x.jpg", QueryPolicy::Strip);
        let b = key("https://CDN/X.jpg?utm=abc#frag", QueryPolicy::Strip);
        assert_eq!(a, b);
        assert_eq!(a, "https://cdn/x.jpg");
    }

    #[test]
    fn test_scheme_and_default_port_collapse() {
        let a = key("http://example.com:80/img/a.png", QueryPolicy::Strip);
        let b = key("https://example.com/img/a.png/", QueryPolicy::Strip);
        assert_eq!(a, b);
        let c = key("https://example.com:8443/img/a.png", QueryPolicy::Strip);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sort_policy_drops_tracking_and_orders_params() {
        let a = key(
            "https://img.example.com/p.jpg?w=800&id=7&utm_source=x&fbclid=abc",
            QueryPolicy::Sort,
        );
        let b = key("https://img.example.com/p.jpg?id=7&w=800", QueryPolicy::Sort);
        assert_eq!(a, b);
        assert_eq!(a, "https://img.example.com/p.jpg?id=7&w=800");

        let only_tracking = key("https://img.example.com/p.jpg?utm=abc", QueryPolicy::Sort);
        assert_eq!(only_tracking, "https://img.example.com/p.jpg");
    }

    #[test]
    fn test_protocol_relative_is_upgraded() {
        let n = normalize_url("//cdn.example.com/a.jpg", QueryPolicy::Strip).unwrap();
        assert_eq!(n.fetch_url, "https://cdn.example.com/a.jpg");
    }

    #[test]
    fn test_fetch_url_keeps_query_but_drops_fragment() {
        let n = normalize_url("https://cdn.example.com/a.jpg?w=1920#top", QueryPolicy::Strip)
            .unwrap();
        assert_eq!(n.fetch_url, "https://cdn.example.com/a.jpg?w=1920");
    }

    #[test]
    fn test_malformed_urls_are_errors() {
        assert_eq!(normalize_url("  ", QueryPolicy::Strip), Err(UrlError::Empty));
        assert!(matches!(
            normalize_url("not a url", QueryPolicy::Strip),
            Err(UrlError::Unparseable { .. })
        ));
        assert!(matches!(
            normalize_url("data:image/png;base64,AAAA", QueryPolicy::Strip),
            Err(UrlError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            normalize_url("ftp://example.com/a.jpg", QueryPolicy::Strip),
            Err(UrlError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn test_domain_helpers() {
        let n = normalize_url("https://www.IGN.com/a.jpg", QueryPolicy::Strip).unwrap();
        assert_eq!(n.domain().as_deref(), Some("ign.com"));
        assert!(host_matches("images.ign.com", "ign.com"));
        assert!(host_matches("ign.com", "www.ign.com"));
        assert!(!host_matches("notign.com", "ign.com"));
        assert_eq!(domain_of_str("garbage"), None);
    }
}
