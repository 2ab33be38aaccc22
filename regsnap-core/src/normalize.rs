//! # Value Normalizers
//!
//! Canonicalization of resource values before they become index keys, and
//! timestamp parsing for the two formats the dump uses.
//!
//! Normalization is pure and total on its input. IP literal parsing is the
//! one fallible operation; a failed parse drops the affected resource from
//! its record and never aborts a refresh.

use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::NaiveDateTime;

use crate::error::{Error, Result};

/// The registry publishes `includeTime` in Moscow local time.
const MOSCOW_UTC_OFFSET_SECS: i64 = 3 * 3600;

/// Canonicalize a domain: trim surrounding whitespace, strip a leading
/// wildcard label, ASCII case fold. Unicode passes through byte-exact;
/// no IDNA mapping is applied.
pub fn normalize_domain(raw: &str) -> String {
    let domain = raw.trim();
    let domain = domain.strip_prefix("*.").unwrap_or(domain);
    domain.to_ascii_lowercase()
}

/// Canonicalize a URL: lowercase the scheme and host, leave path and query
/// untouched. Inputs without a scheme separator are returned verbatim.
pub fn normalize_url(raw: &str) -> String {
    let Some(scheme_end) = raw.find("://") else {
        return raw.to_string();
    };
    let (scheme, rest) = raw.split_at(scheme_end);
    let after_scheme = &rest[3..];
    let host_end = after_scheme
        .find(['/', '?', '#'])
        .unwrap_or(after_scheme.len());
    let (host, tail) = after_scheme.split_at(host_end);

    let mut out = String::with_capacity(raw.len());
    out.push_str(&scheme.to_ascii_lowercase());
    out.push_str("://");
    out.push_str(&host.to_ascii_lowercase());
    out.push_str(tail);
    out
}

/// A URL counts toward the HTTPS block rule iff its canonical form carries
/// the https scheme.
pub fn is_https(normalized_url: &str) -> bool {
    normalized_url.starts_with("https://")
}

/// Parse an IPv4 dotted-quad literal to a big-endian 32-bit integer.
pub fn parse_ip4(raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| Error::ValueParse {
            kind: "ipv4",
            value: raw.to_string(),
        })
}

/// Parse an IPv6 literal. The 16-byte address is the index key.
pub fn parse_ip6(raw: &str) -> Result<Ipv6Addr> {
    raw.trim().parse::<Ipv6Addr>().map_err(|_| Error::ValueParse {
        kind: "ipv6",
        value: raw.to_string(),
    })
}

/// Subnet notations are indexed verbatim after a whitespace trim; no
/// equivalence is applied across notations.
pub fn normalize_subnet(raw: &str) -> String {
    raw.trim().to_string()
}

/// Parse an RFC3339 timestamp to Unix seconds. The registry's zero time
/// maps to 0, as does any unparsable value.
pub fn parse_rfc3339(raw: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp interpreted as Moscow local
/// time (UTC+3) to Unix seconds. Unparsable values map to 0.
pub fn parse_moscow_time(raw: &str) -> i64 {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc().timestamp() - MOSCOW_UTC_OFFSET_SECS)
        .unwrap_or(0)
}
