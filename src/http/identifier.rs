//! Caller identification from request headers.

use axum::http::HeaderMap;

use crate::ratelimit::ANONYMOUS;

/// Headers consulted for the caller identifier, in priority order.
pub const IDENTIFIER_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Derive the identifier counters are partitioned by.
///
/// Takes the first non-empty value among [`IDENTIFIER_HEADERS`]. For
/// `X-Forwarded-For` only the leftmost (client) entry is used. Falls back to
/// `"anonymous"`, so every unidentifiable caller shares one counter.
pub fn client_identifier(headers: &HeaderMap) -> String {
    IDENTIFIER_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or(value).trim())
        .find(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_forwarded_for_wins() {
        let map = headers(&[
            ("x-forwarded-for", "1.2.3.4"),
            ("x-real-ip", "5.6.7.8"),
            ("cf-connecting-ip", "9.9.9.9"),
        ]);
        assert_eq!(client_identifier(&map), "1.2.3.4");
    }

    #[test]
    fn test_forwarded_for_uses_leftmost_entry() {
        let map = headers(&[("x-forwarded-for", " 1.2.3.4 , 10.0.0.1, 10.0.0.2")]);
        assert_eq!(client_identifier(&map), "1.2.3.4");
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let map = headers(&[("x-forwarded-for", " "), ("x-real-ip", "5.6.7.8")]);
        assert_eq!(client_identifier(&map), "5.6.7.8");

        let map = headers(&[("x-real-ip", ""), ("cf-connecting-ip", "9.9.9.9")]);
        assert_eq!(client_identifier(&map), "9.9.9.9");
    }

    #[test]
    fn test_no_signal_is_anonymous() {
        assert_eq!(client_identifier(&HeaderMap::new()), "anonymous");
    }
}
