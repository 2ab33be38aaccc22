//! The in-memory projection of one registry record.

use bytes::Bytes;
use serde::Serialize;
use tracing::warn;

use regsnap_core::ContentId;

use crate::record::{
    DomainResource, Ip4Resource, Ip6Resource, SubnetResource, UrlResource,
};

/// Kind of block a record mandates. Derived from the raw `blockType`
/// attribute and the record's URL list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockType {
    Url,
    Https,
    Domain,
    Mask,
    Ip,
}

impl BlockType {
    /// Pure derivation: explicit attribute values map directly; everything
    /// else, the unknown values included, falls through to the URL/HTTPS
    /// rule on the record's URL list.
    pub fn derive(raw: &str, https_urls: usize) -> Self {
        match raw {
            "ip" => BlockType::Ip,
            "domain" => BlockType::Domain,
            "domain-mask" => BlockType::Mask,
            other => {
                if !other.is_empty() && other != "default" {
                    warn!(block_type = other, "unknown block type");
                }
                if https_urls > 0 {
                    BlockType::Https
                } else {
                    BlockType::Url
                }
            }
        }
    }
}

/// Packed entry: record metadata, the canonical payload bytes, and the
/// current resource lists. Indexes refer to entries by id only.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: ContentId,
    /// Fingerprint of the record's raw XML bytes at the last refresh that
    /// changed it.
    pub record_hash: u64,
    /// Global timestamp of the last refresh that saw this record.
    pub registry_update_time: i64,
    pub block_type: BlockType,
    /// Canonical JSON bytes of the decoded record.
    pub payload: Bytes,
    /// Fingerprint of the current decision triple.
    pub decision_hash: u64,
    pub ip4: Vec<Ip4Resource>,
    pub ip6: Vec<Ip6Resource>,
    pub subnet4: Vec<SubnetResource>,
    pub subnet6: Vec<SubnetResource>,
    pub domain: Vec<DomainResource>,
    pub url: Vec<UrlResource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_block_types_win() {
        assert_eq!(BlockType::derive("ip", 5), BlockType::Ip);
        assert_eq!(BlockType::derive("domain", 5), BlockType::Domain);
        assert_eq!(BlockType::derive("domain-mask", 0), BlockType::Mask);
    }

    #[test]
    fn default_and_unknown_fall_through_to_url_rule() {
        assert_eq!(BlockType::derive("default", 0), BlockType::Url);
        assert_eq!(BlockType::derive("", 1), BlockType::Https);
        assert_eq!(BlockType::derive("mystery", 0), BlockType::Url);
        assert_eq!(BlockType::derive("mystery", 2), BlockType::Https);
    }
}
