// src/fingerprint.rs

//! Client fingerprints derived from the anonymized address and user agent.
//!
//! Two variants share one derivation. The visitor variant mixes in the calendar
//! day so it rotates daily; the abuse variant leaves the day out so repeated
//! abuse from one client keeps hitting the same counters.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// Placeholder for a missing address or user agent.
pub const UNKNOWN: &str = "unknown";

/// Hex length of the abuse-tracking fingerprint.
pub const ABUSE_FINGERPRINT_LEN: usize = 16;

/// A lowercase hex digest identifying a client without storing raw request data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Daily-rotating visitor identity: full SHA-256 over address, agent and day.
    pub fn visitor(addr: &str, user_agent: &str, day: NaiveDate) -> Self {
        let stamp = day.format("%Y-%m-%d").to_string();
        Self(digest(addr, user_agent, Some(&stamp)))
    }

    /// Stable abuse-tracking identity, truncated to keep counter keys short.
    pub fn abuse(addr: &str, user_agent: &str) -> Self {
        let mut hex = digest(addr, user_agent, None);
        hex.truncate(ABUSE_FINGERPRINT_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn digest(addr: &str, user_agent: &str, day: Option<&str>) -> String {
    let addr = anonymize_ip(addr);
    let agent = if user_agent.is_empty() {
        UNKNOWN
    } else {
        user_agent
    };

    let base = match day {
        Some(day) => format!("{}|{}|{}", addr, agent, day),
        None => format!("{}|{}", addr, agent),
    };

    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    hex::encode(hasher.finalize())
}

/// Drops the host part of a client address.
///
/// Four-part dotted addresses lose their last octet; colon addresses keep
/// only the first two groups. Other shapes pass through unchanged.
pub fn anonymize_ip(addr: &str) -> String {
    let addr = addr.trim();
    if addr.is_empty() {
        return UNKNOWN.to_string();
    }

    if addr.contains('.') {
        let parts: Vec<&str> = addr.split('.').collect();
        if parts.len() == 4 {
            return format!("{}.{}.{}.0", parts[0], parts[1], parts[2]);
        }
    } else if addr.contains(':') {
        let parts: Vec<&str> = addr.split(':').collect();
        if parts.len() > 2 {
            return format!("{}::", parts[..2].join(":"));
        }
    }

    addr.to_string()
}

// Header names, matched case-insensitively.
pub const HEADER_TRUSTED_PROXY: &str = "cf-connecting-ip";
pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
pub const HEADER_REAL_IP: &str = "x-real-ip";
pub const HEADER_USER_AGENT: &str = "user-agent";
pub const HEADER_PUBLIC_KEY: &str = "x-public-key";
pub const HEADER_SECRET_KEY: &str = "x-secret-key";

/// Request metadata the pipeline needs, extracted from headers and the peer address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub addr: String,
    pub user_agent: String,
}

impl ClientMeta {
    pub fn new(addr: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Resolves the client address from the trusted proxy header, then the first
    /// `X-Forwarded-For` entry, then `X-Real-IP`, then the transport peer.
    pub fn from_headers(headers: &HashMap<String, String>, peer: Option<SocketAddr>) -> Self {
        let lowered: HashMap<String, &str> = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
            .collect();
        let header = |name: &str| {
            lowered
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let addr = header(HEADER_TRUSTED_PROXY)
            .map(str::to_string)
            .or_else(|| {
                header(HEADER_FORWARDED_FOR)
                    .and_then(|v| v.split(',').next())
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
            .or_else(|| header(HEADER_REAL_IP).map(str::to_string))
            .or_else(|| peer.map(|p| p.ip().to_string()))
            .unwrap_or_default();

        let user_agent = header(HEADER_USER_AGENT).unwrap_or_default().to_string();

        Self { addr, user_agent }
    }

    pub fn abuse_fingerprint(&self) -> Fingerprint {
        Fingerprint::abuse(&self.addr, &self.user_agent)
    }

    pub fn visitor_fingerprint(&self, day: NaiveDate) -> Fingerprint {
        Fingerprint::visitor(&self.addr, &self.user_agent, day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_anonymize_ipv4_zeroes_last_octet() {
        assert_eq!(anonymize_ip("203.0.113.42"), "203.0.113.0");
        assert_eq!(anonymize_ip("203.0.113.7"), "203.0.113.0");
    }

    #[test]
    fn test_anonymize_ipv6_keeps_two_groups() {
        assert_eq!(anonymize_ip("2001:db8:85a3::8a2e:370:7334"), "2001:db8::");
        // Two groups or fewer are left alone
        assert_eq!(anonymize_ip("fe80:1"), "fe80:1");
    }

    #[test]
    fn test_anonymize_missing_and_odd_shapes() {
        assert_eq!(anonymize_ip(""), UNKNOWN);
        assert_eq!(anonymize_ip("   "), UNKNOWN);
        assert_eq!(anonymize_ip("10.0.1"), "10.0.1");
        assert_eq!(anonymize_ip("localhost"), "localhost");
    }

    #[test]
    fn test_visitor_fingerprint_is_deterministic() {
        let a = Fingerprint::visitor("198.51.100.10", "Mozilla/5.0", day(2026, 3, 14));
        let b = Fingerprint::visitor("198.51.100.10", "Mozilla/5.0", day(2026, 3, 14));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_visitor_fingerprint_rotates_daily() {
        let monday = Fingerprint::visitor("198.51.100.10", "Mozilla/5.0", day(2026, 3, 16));
        let tuesday = Fingerprint::visitor("198.51.100.10", "Mozilla/5.0", day(2026, 3, 17));
        assert_ne!(monday, tuesday);
    }

    #[test]
    fn test_same_subnet_shares_fingerprint() {
        let a = Fingerprint::abuse("192.0.2.1", "curl/8.0");
        let b = Fingerprint::abuse("192.0.2.254", "curl/8.0");
        assert_eq!(a, b);

        let a = Fingerprint::visitor("192.0.2.1", "curl/8.0", day(2026, 1, 1));
        let b = Fingerprint::visitor("192.0.2.254", "curl/8.0", day(2026, 1, 1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_abuse_fingerprint_is_short_and_day_free() {
        let fp = Fingerprint::abuse("192.0.2.1", "curl/8.0");
        assert_eq!(fp.as_str().len(), ABUSE_FINGERPRINT_LEN);
        assert_eq!(fp, Fingerprint::abuse("192.0.2.1", "curl/8.0"));
    }

    #[test]
    fn test_missing_agent_uses_placeholder() {
        let empty = Fingerprint::abuse("", "");
        let explicit = Fingerprint::abuse("unknown", "unknown");
        assert_eq!(empty, explicit);
    }

    #[test]
    fn test_client_meta_header_priority() {
        let peer: SocketAddr = "127.0.0.1:55000".parse().unwrap();

        let mut headers = HashMap::new();
        headers.insert("X-Real-IP".to_string(), "10.1.1.1".to_string());
        headers.insert(
            "X-Forwarded-For".to_string(),
            "203.0.113.9, 10.0.0.2".to_string(),
        );
        headers.insert("User-Agent".to_string(), "sdk/1.2".to_string());
        let meta = ClientMeta::from_headers(&headers, Some(peer));
        assert_eq!(meta.addr, "203.0.113.9");
        assert_eq!(meta.user_agent, "sdk/1.2");

        headers.insert("CF-Connecting-IP".to_string(), "198.51.100.3".to_string());
        let meta = ClientMeta::from_headers(&headers, Some(peer));
        assert_eq!(meta.addr, "198.51.100.3");

        let meta = ClientMeta::from_headers(&HashMap::new(), Some(peer));
        assert_eq!(meta.addr, "127.0.0.1");
        assert_eq!(meta.user_agent, "");
    }

    #[test]
    fn test_client_meta_without_any_source_is_empty() {
        let meta = ClientMeta::from_headers(&HashMap::new(), None);
        assert_eq!(meta.addr, "");
        // Still fingerprints
        assert_eq!(meta.abuse_fingerprint(), Fingerprint::abuse(UNKNOWN, UNKNOWN));
    }
}
