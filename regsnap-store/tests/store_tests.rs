//! Store-level scenarios: add/update/unchanged classification, index
//! back-references across updates and sweeps, and invariant checks.

use std::net::Ipv4Addr;

use fnv::FnvHashSet;

use regsnap_core::config::StoreConfig;
use regsnap_core::fingerprint::record_fingerprint;
use regsnap_core::metrics::Metrics;
use regsnap_store::{BlockType, DumpStore, UpsertOutcome};

fn new_store() -> DumpStore {
    DumpStore::new(StoreConfig::default(), Metrics::new())
}

/// Feed one raw record, fingerprinting it the way the parser does.
fn upsert(store: &DumpStore, id: i32, raw: &str, utime: i64) -> UpsertOutcome {
    store
        .upsert(id, raw.as_bytes(), record_fingerprint(raw.as_bytes()), utime)
        .unwrap()
}

fn seen(ids: &[i32]) -> FnvHashSet<i32> {
    ids.iter().copied().collect()
}

const ENTRY_1_HTTPS: &str = r#"<content id="1" blockType="default" ts="2024-01-01T00:00:00Z">
  <decision org="org" number="1/1" date="2024-01-01"/>
  <url ts="2024-01-01T00:00:00Z">https://a.example/</url>
</content>"#;

const ENTRY_1_HTTP: &str = r#"<content id="1" blockType="default" ts="2024-01-02T00:00:00Z">
  <decision org="org" number="1/1" date="2024-01-01"/>
  <url ts="2024-01-02T00:00:00Z">http://b.example/</url>
</content>"#;

#[test]
fn cold_add_indexes_and_classifies() {
    let store = new_store();
    assert_eq!(upsert(&store, 1, ENTRY_1_HTTPS, 100), UpsertOutcome::Added);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);

    let matches = snapshot.lookup_url("https://a.example/");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, 1);
    assert_eq!(matches[0].block_type, BlockType::Https);
    assert_eq!(matches[0].registry_update_time, 100);
    assert_eq!(matches[0].matched_value, "https://a.example/");
    assert!(!matches[0].payload.is_empty());

    snapshot.verify_invariants().unwrap();
}

#[test]
fn unchanged_refresh_only_advances_update_time() {
    let store = new_store();
    assert_eq!(upsert(&store, 1, ENTRY_1_HTTPS, 100), UpsertOutcome::Added);
    assert_eq!(upsert(&store, 1, ENTRY_1_HTTPS, 200), UpsertOutcome::Unchanged);

    let snapshot = store.snapshot();
    let entry = snapshot.get(1).unwrap();
    assert_eq!(entry.registry_update_time, 200);
    assert_eq!(snapshot.lookup_url("https://a.example/").len(), 1);
}

#[test]
fn url_replacement_moves_index_key_and_block_type() {
    let store = new_store();
    upsert(&store, 1, ENTRY_1_HTTPS, 100);
    assert_eq!(upsert(&store, 1, ENTRY_1_HTTP, 200), UpsertOutcome::Updated);

    let snapshot = store.snapshot();
    assert!(snapshot.lookup_url("https://a.example/").is_empty());
    let matches = snapshot.lookup_url("http://b.example/");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].block_type, BlockType::Url);

    // Identity is stable across the update.
    assert_eq!(snapshot.get(1).unwrap().id, 1);
    snapshot.verify_invariants().unwrap();
}

#[test]
fn ip4_and_subnet_co_index() {
    let store = new_store();
    let raw = r#"<content id="2" blockType="ip" ts="2024-01-01T00:00:00Z">
  <decision org="org" number="2/2" date="2024-01-01"/>
  <ip ts="2024-01-01T00:00:00Z">10.0.0.1</ip>
  <ipSubnet ts="2024-01-01T00:00:00Z">10.0.0.0/24</ipSubnet>
</content>"#;
    upsert(&store, 2, raw, 100);

    let snapshot = store.snapshot();
    let by_addr = snapshot.lookup_ip4(Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(by_addr.len(), 1);
    assert_eq!(by_addr[0].id, 2);
    assert_eq!(by_addr[0].block_type, BlockType::Ip);

    let by_subnet = snapshot.lookup_subnet4("10.0.0.0/24");
    assert_eq!(by_subnet.len(), 1);
    assert_eq!(by_subnet[0].id, 2);
}

#[test]
fn ipv6_subnets_use_their_own_index() {
    let store = new_store();
    let raw = r#"<content id="9" blockType="ip" ts="2024-01-01T00:00:00Z">
  <decision org="org" number="9/9" date="2024-01-01"/>
  <ipv6Subnet ts="2024-01-01T00:00:00Z">2001:db8::/32</ipv6Subnet>
</content>"#;
    upsert(&store, 9, raw, 100);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.lookup_subnet6("2001:db8::/32").len(), 1);
    assert!(snapshot.lookup_subnet4("2001:db8::/32").is_empty());

    let stats = store.stats();
    assert_eq!(stats.subnet6_keys, 1);
    assert_eq!(stats.subnet4_keys, 0);
}

#[test]
fn shared_value_set_shrinks_then_prunes() {
    let store = new_store();
    let raw_3 = r#"<content id="3" blockType="domain" ts="2024-01-01T00:00:00Z">
  <decision org="org" number="3/3" date="2024-01-01"/>
  <domain ts="2024-01-01T00:00:00Z">x.test</domain>
</content>"#;
    let raw_4 = r#"<content id="4" blockType="domain" ts="2024-01-01T00:00:00Z">
  <decision org="org" number="4/4" date="2024-01-01"/>
  <domain ts="2024-01-01T00:00:00Z">x.test</domain>
</content>"#;
    upsert(&store, 3, raw_3, 100);
    upsert(&store, 4, raw_4, 100);

    {
        let snapshot = store.snapshot();
        let matches = snapshot.lookup_domain("x.test");
        assert_eq!(matches.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    assert_eq!(store.sweep(&seen(&[4]), 200), 1);
    {
        let snapshot = store.snapshot();
        let matches = snapshot.lookup_domain("x.test");
        assert_eq!(matches.iter().map(|m| m.id).collect::<Vec<_>>(), vec![4]);
        snapshot.verify_invariants().unwrap();
    }

    assert_eq!(store.sweep(&seen(&[]), 300), 1);
    let snapshot = store.snapshot();
    assert!(snapshot.lookup_domain("x.test").is_empty());
    assert_eq!(store.stats().domain_keys, 0);
}

#[test]
fn sweep_removes_unseen_entries_and_decisions() {
    let store = new_store();
    upsert(&store, 1, ENTRY_1_HTTPS, 100);
    let raw_2 = r#"<content id="2" blockType="ip" ts="2024-01-01T00:00:00Z">
  <decision org="org" number="2/2" date="2024-01-01"/>
  <ip ts="2024-01-01T00:00:00Z">10.0.0.2</ip>
</content>"#;
    let raw_3 = r#"<content id="3" blockType="domain" ts="2024-01-01T00:00:00Z">
  <decision org="org" number="3/3" date="2024-01-01"/>
  <domain ts="2024-01-01T00:00:00Z">y.test</domain>
</content>"#;
    upsert(&store, 2, raw_2, 100);
    upsert(&store, 3, raw_3, 100);

    assert_eq!(store.sweep(&seen(&[2]), 200), 2);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.get(2).is_some());
    assert!(snapshot.lookup_url("https://a.example/").is_empty());
    assert!(snapshot.lookup_domain("y.test").is_empty());
    assert!(snapshot.lookup_decision("org", "1/1", "2024-01-01").is_empty());
    assert!(snapshot.lookup_decision("org", "3/3", "2024-01-01").is_empty());
    assert_eq!(snapshot.lookup_decision("org", "2/2", "2024-01-01").len(), 1);
    assert_eq!(snapshot.update_time(), 200);
    snapshot.verify_invariants().unwrap();
}

#[test]
fn duplicate_values_collapse_on_insert() {
    let store = new_store();
    let raw = r#"<content id="5" blockType="default" ts="2024-01-01T00:00:00Z">
  <decision org="org" number="5/5" date="2024-01-01"/>
  <url ts="2024-01-01T00:00:00Z">http://dup.example/</url>
  <url ts="2024-01-01T00:00:00Z">http://dup.example/</url>
</content>"#;
    upsert(&store, 5, raw, 100);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.get(5).unwrap().url.len(), 1);
    assert_eq!(snapshot.lookup_url("http://dup.example/").len(), 1);
    snapshot.verify_invariants().unwrap();
}

#[test]
fn decision_change_regroups_entry() {
    let store = new_store();
    upsert(&store, 1, ENTRY_1_HTTPS, 100);
    let raw = r#"<content id="1" blockType="default" ts="2024-01-03T00:00:00Z">
  <decision org="org" number="99/9" date="2024-01-03"/>
  <url ts="2024-01-01T00:00:00Z">https://a.example/</url>
</content>"#;
    assert_eq!(upsert(&store, 1, raw, 200), UpsertOutcome::Updated);

    let snapshot = store.snapshot();
    assert!(snapshot.lookup_decision("org", "1/1", "2024-01-01").is_empty());
    assert_eq!(snapshot.lookup_decision("org", "99/9", "2024-01-03").len(), 1);
    snapshot.verify_invariants().unwrap();
}

#[test]
fn timestamp_change_keeps_index_back_reference() {
    let store = new_store();
    upsert(&store, 1, ENTRY_1_HTTPS, 100);

    // Same URL under a new ts: the list element is replaced but the index
    // key must keep pointing at the entry throughout.
    let raw = r#"<content id="1" blockType="default" ts="2024-01-04T00:00:00Z">
  <decision org="org" number="1/1" date="2024-01-01"/>
  <url ts="2024-01-04T00:00:00Z">https://a.example/</url>
</content>"#;
    assert_eq!(upsert(&store, 1, raw, 200), UpsertOutcome::Updated);

    let snapshot = store.snapshot();
    let entry = snapshot.get(1).unwrap();
    assert_eq!(entry.url.len(), 1);
    assert_eq!(entry.url[0].ts, 1_704_326_400);
    assert_eq!(snapshot.lookup_url("https://a.example/").len(), 1);
    snapshot.verify_invariants().unwrap();
}

#[test]
fn record_decode_error_leaves_store_untouched() {
    let store = new_store();
    upsert(&store, 1, ENTRY_1_HTTPS, 100);

    let bad = r#"<content id="1" blockType="default"><url ts="x">http://truncated"#;
    let err = store
        .upsert(1, bad.as_bytes(), record_fingerprint(bad.as_bytes()), 200)
        .unwrap_err();
    assert_eq!(err.error_code(), "RECORD_DECODE_ERROR");

    let snapshot = store.snapshot();
    assert_eq!(snapshot.lookup_url("https://a.example/").len(), 1);
    assert_eq!(store.metrics().snapshot().record_decode_errors, 1);
}

#[test]
fn bump_update_time_touches_every_entry() {
    let store = new_store();
    upsert(&store, 1, ENTRY_1_HTTPS, 100);
    let raw_2 = r#"<content id="2" blockType="ip" ts="2024-01-01T00:00:00Z">
  <decision org="org" number="2/2" date="2024-01-01"/>
  <ip ts="2024-01-01T00:00:00Z">10.0.0.2</ip>
</content>"#;
    upsert(&store, 2, raw_2, 100);

    store.bump_update_time(500);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.get(1).unwrap().registry_update_time, 500);
    assert_eq!(snapshot.get(2).unwrap().registry_update_time, 500);
    assert_eq!(snapshot.update_time(), 500);
}

#[test]
fn touch_unknown_id_reports_false() {
    let store = new_store();
    assert!(!store.touch(404, 100));
    upsert(&store, 1, ENTRY_1_HTTPS, 100);
    assert!(store.touch(1, 300));
    assert_eq!(store.snapshot().get(1).unwrap().registry_update_time, 300);
}

#[test]
fn stats_report_per_index_sizes() {
    let store = new_store();
    upsert(&store, 1, ENTRY_1_HTTPS, 100);
    let raw_2 = r#"<content id="2" blockType="ip" ts="2024-01-01T00:00:00Z">
  <decision org="org" number="2/2" date="2024-01-01"/>
  <ip ts="2024-01-01T00:00:00Z">10.0.0.2</ip>
  <ipv6 ts="2024-01-01T00:00:00Z">2001:db8::2</ipv6>
</content>"#;
    upsert(&store, 2, raw_2, 100);

    let stats = store.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.url_keys, 1);
    assert_eq!(stats.ip4_keys, 1);
    assert_eq!(stats.ip6_keys, 1);
    assert_eq!(stats.decision_keys, 2);
    assert_eq!(stats.max_idset_len, 1);
}
