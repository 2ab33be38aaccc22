//! # Dump Store
//!
//! The owned, process-local mirror of the registry: entry map, the seven
//! inverted indexes, and the global update time, all guarded by one
//! reader-writer lock.
//!
//! A refresh holds the write half per record mutation; queries hold the
//! read half for the duration of one snapshot. Every mutation leaves the
//! store in a state where the entry lists and the indexes are mutually
//! consistent, so a reader never observes a half-applied record.

use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::{RwLock, RwLockReadGuard};

use regsnap_core::config::StoreConfig;
use regsnap_core::error::{Error, Result};
use regsnap_core::fingerprint::decision_fingerprint;
use regsnap_core::metrics::Metrics;
use regsnap_core::normalize::{is_https, normalize_domain, normalize_subnet, normalize_url};
use regsnap_core::ContentId;

use crate::entry::{BlockType, Entry};
use crate::idset::IdSet;
use crate::index::ResourceIndex;
use crate::record::{Decision, Record};

/// Classification of one record against the held state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
    Unchanged,
}

/// Store-level statistics, recomputed on demand.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub entries: usize,
    pub ip4_keys: usize,
    pub ip6_keys: usize,
    pub subnet4_keys: usize,
    pub subnet6_keys: usize,
    pub domain_keys: usize,
    pub url_keys: usize,
    pub decision_keys: usize,
    /// Largest id set across the six resource indexes.
    pub max_idset_len: usize,
}

/// One query hit: entry projection plus the key that matched.
#[derive(Debug, Clone)]
pub struct LookupMatch {
    pub id: ContentId,
    pub block_type: BlockType,
    pub registry_update_time: i64,
    pub matched_value: String,
    pub payload: Bytes,
}

struct DumpState {
    entries: FnvHashMap<ContentId, Entry>,
    ip4_idx: ResourceIndex<u32>,
    ip6_idx: ResourceIndex<Ipv6Addr>,
    subnet4_idx: ResourceIndex<String>,
    subnet6_idx: ResourceIndex<String>,
    domain_idx: ResourceIndex<String>,
    url_idx: ResourceIndex<String>,
    decision_idx: ResourceIndex<u64>,
    update_time: i64,
}

/// The mirror. Owns all entries and indexes; no hidden globals.
pub struct DumpStore {
    state: RwLock<DumpState>,
    metrics: Metrics,
}

impl DumpStore {
    pub fn new(config: StoreConfig, metrics: Metrics) -> Self {
        Self {
            state: RwLock::new(DumpState {
                entries: FnvHashMap::with_capacity_and_hasher(
                    config.expected_entries,
                    Default::default(),
                ),
                ip4_idx: ResourceIndex::new(),
                ip6_idx: ResourceIndex::new(),
                subnet4_idx: ResourceIndex::new(),
                subnet6_idx: ResourceIndex::new(),
                domain_idx: ResourceIndex::new(),
                url_idx: ResourceIndex::new(),
                decision_idx: ResourceIndex::new(),
                update_time: 0,
            }),
            metrics,
        }
    }

    /// Classify and apply one record under the write capability.
    ///
    /// Absent id: decode and insert. Present id with a differing raw-byte
    /// fingerprint: decode and merge in place. Otherwise the record is
    /// byte-identical to the held one and only its update time advances.
    /// Decode failures propagate; the store is untouched in that case.
    pub fn upsert(
        &self,
        id: ContentId,
        raw: &[u8],
        record_hash: u64,
        update_time: i64,
    ) -> Result<UpsertOutcome> {
        let mut state = self.state.write();

        let held_hash = state.entries.get(&id).map(|entry| entry.record_hash);
        match held_hash {
            None => {
                let record = self.decode_counted(raw, id)?;
                state.insert_entry(record, record_hash, update_time)?;
                Ok(UpsertOutcome::Added)
            }
            Some(held) if held != record_hash => {
                let record = self.decode_counted(raw, id)?;
                state.merge_entry(record, record_hash, update_time)?;
                Ok(UpsertOutcome::Updated)
            }
            Some(_) => {
                state.touch_entry(id, update_time);
                Ok(UpsertOutcome::Unchanged)
            }
        }
    }

    fn decode_counted(&self, raw: &[u8], id: ContentId) -> Result<Record> {
        let record = Record::decode(raw).inspect_err(|_| self.metrics.record_decode_error())?;
        debug_assert_eq!(record.id, id, "journaled id diverges from decoded id");
        self.metrics
            .record_value_parse_errors(u64::from(record.dropped_values));
        Ok(record)
    }

    /// Advance the update time of an unchanged entry. Returns false when
    /// the id is unknown.
    pub fn touch(&self, id: ContentId, update_time: i64) -> bool {
        self.state.write().touch_entry(id, update_time)
    }

    /// Touch-only refresh: the dump content was byte-identical but its
    /// metadata moved, so every entry and the global clock advance.
    pub fn bump_update_time(&self, update_time: i64) {
        let mut state = self.state.write();
        for entry in state.entries.values_mut() {
            entry.registry_update_time = update_time;
        }
        state.update_time = update_time;
    }

    /// Remove every entry absent from `seen`, unwinding all of its index
    /// back-references. Returns the number of entries removed.
    pub fn sweep(&self, seen: &FnvHashSet<ContentId>, update_time: i64) -> usize {
        self.state.write().sweep(seen, update_time)
    }

    /// Read capability over a writer-quiescent state.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            state: self.state.read(),
            metrics: &self.metrics,
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.state.read().stats()
    }

    pub fn update_time(&self) -> i64 {
        self.state.read().update_time
    }

    pub fn entry_count(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl DumpState {
    fn touch_entry(&mut self, id: ContentId, update_time: i64) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.registry_update_time = update_time;
                true
            }
            None => false,
        }
    }

    /// Add path: copy resource lists (first-seen order, de-duplicated),
    /// index every value, derive the block type, hash the decision.
    fn insert_entry(&mut self, record: Record, record_hash: u64, update_time: i64) -> Result<()> {
        let payload = record.to_payload()?;
        let https_urls = record.https_url_count();
        let Record {
            id,
            block_type,
            decision,
            url,
            domain,
            ip4,
            ip6,
            subnet4,
            subnet6,
            ..
        } = record;

        let decision_hash = hash_decision(&decision);
        let mut entry = Entry {
            id,
            record_hash,
            registry_update_time: update_time,
            block_type: BlockType::derive(&block_type, https_urls),
            payload,
            decision_hash,
            ip4: Vec::new(),
            ip6: Vec::new(),
            subnet4: Vec::new(),
            subnet6: Vec::new(),
            domain: Vec::new(),
            url: Vec::new(),
        };

        copy_list(ip4, &mut entry.ip4, &mut self.ip4_idx, id, |v| v.addr);
        copy_list(ip6, &mut entry.ip6, &mut self.ip6_idx, id, |v| v.addr);
        copy_list(subnet4, &mut entry.subnet4, &mut self.subnet4_idx, id, |v| {
            v.subnet.clone()
        });
        copy_list(subnet6, &mut entry.subnet6, &mut self.subnet6_idx, id, |v| {
            v.subnet.clone()
        });
        copy_list(domain, &mut entry.domain, &mut self.domain_idx, id, |v| {
            normalize_domain(&v.domain)
        });
        copy_list(url, &mut entry.url, &mut self.url_idx, id, |v| {
            normalize_url(&v.url)
        });
        self.decision_idx.insert(decision_hash, id);

        self.entries.insert(id, entry);
        Ok(())
    }

    /// Update path: per-list diff against the prior image, adds applied
    /// before removals, then block type, decision grouping, and record
    /// metadata are refreshed.
    fn merge_entry(&mut self, record: Record, record_hash: u64, update_time: i64) -> Result<()> {
        let payload = record.to_payload()?;
        let Record {
            id,
            block_type,
            decision,
            url,
            domain,
            ip4,
            ip6,
            subnet4,
            subnet6,
            ..
        } = record;

        let entry = self.entries.get_mut(&id).ok_or_else(|| Error::Internal {
            message: format!("merge of unknown entry {id}"),
        })?;

        diff_apply(&mut entry.ip4, ip4, &mut self.ip4_idx, id, |v| v.addr);
        diff_apply(&mut entry.ip6, ip6, &mut self.ip6_idx, id, |v| v.addr);
        diff_apply(&mut entry.subnet4, subnet4, &mut self.subnet4_idx, id, |v| {
            v.subnet.clone()
        });
        diff_apply(&mut entry.subnet6, subnet6, &mut self.subnet6_idx, id, |v| {
            v.subnet.clone()
        });
        diff_apply(&mut entry.domain, domain, &mut self.domain_idx, id, |v| {
            normalize_domain(&v.domain)
        });
        diff_apply(&mut entry.url, url, &mut self.url_idx, id, |v| {
            normalize_url(&v.url)
        });

        let https_urls = entry
            .url
            .iter()
            .filter(|u| is_https(&normalize_url(&u.url)))
            .count();
        entry.block_type = BlockType::derive(&block_type, https_urls);

        let decision_hash = hash_decision(&decision);
        if entry.decision_hash != decision_hash {
            self.decision_idx.remove(&entry.decision_hash, id);
            self.decision_idx.insert(decision_hash, id);
            entry.decision_hash = decision_hash;
        }

        entry.record_hash = record_hash;
        entry.registry_update_time = update_time;
        entry.payload = payload;
        Ok(())
    }

    fn sweep(&mut self, seen: &FnvHashSet<ContentId>, update_time: i64) -> usize {
        let dead: Vec<ContentId> = self
            .entries
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();

        for id in &dead {
            if let Some(entry) = self.entries.remove(id) {
                for v in &entry.ip4 {
                    self.ip4_idx.remove(&v.addr, entry.id);
                }
                for v in &entry.ip6 {
                    self.ip6_idx.remove(&v.addr, entry.id);
                }
                for v in &entry.subnet4 {
                    self.subnet4_idx.remove(&v.subnet, entry.id);
                }
                for v in &entry.subnet6 {
                    self.subnet6_idx.remove(&v.subnet, entry.id);
                }
                for v in &entry.domain {
                    self.domain_idx.remove(&normalize_domain(&v.domain), entry.id);
                }
                for v in &entry.url {
                    self.url_idx.remove(&normalize_url(&v.url), entry.id);
                }
                self.decision_idx.remove(&entry.decision_hash, entry.id);
            }
        }

        self.update_time = update_time;
        dead.len()
    }

    fn stats(&self) -> StoreStats {
        let max_idset_len = self
            .ip4_idx
            .max_set_len()
            .max(self.ip6_idx.max_set_len())
            .max(self.subnet4_idx.max_set_len())
            .max(self.subnet6_idx.max_set_len())
            .max(self.domain_idx.max_set_len())
            .max(self.url_idx.max_set_len());

        StoreStats {
            entries: self.entries.len(),
            ip4_keys: self.ip4_idx.len(),
            ip6_keys: self.ip6_idx.len(),
            subnet4_keys: self.subnet4_idx.len(),
            subnet6_keys: self.subnet6_idx.len(),
            domain_keys: self.domain_idx.len(),
            url_keys: self.url_idx.len(),
            decision_keys: self.decision_idx.len(),
            max_idset_len,
        }
    }
}

fn hash_decision(decision: &Decision) -> u64 {
    decision_fingerprint(&decision.org, &decision.number, &decision.date)
}

/// Add-path list copy: first-seen order, duplicates collapsed on insert.
fn copy_list<T, K>(
    incoming: Vec<T>,
    list: &mut Vec<T>,
    idx: &mut ResourceIndex<K>,
    id: ContentId,
    norm: impl Fn(&T) -> K,
) where
    T: PartialEq,
    K: Eq + Hash,
{
    for value in incoming {
        if list.contains(&value) {
            continue;
        }
        idx.insert(norm(&value), id);
        list.push(value);
    }
}

/// Update-path list diff. Adds run before removals so a value present in
/// both images never goes absent in between. An index back-reference is
/// dropped only when no element of the post-update list still normalizes
/// to its key, which keeps the list/index invariant intact when the same
/// value reappears under a new timestamp.
fn diff_apply<T, K>(
    list: &mut Vec<T>,
    incoming: Vec<T>,
    idx: &mut ResourceIndex<K>,
    id: ContentId,
    norm: impl Fn(&T) -> K,
) where
    T: PartialEq + Clone,
    K: Eq + Hash,
{
    let prior = list.clone();

    for value in &incoming {
        if !list.contains(value) {
            list.push(value.clone());
        }
        idx.insert(norm(value), id);
    }

    for value in &prior {
        if incoming.contains(value) {
            continue;
        }
        if let Some(pos) = list.iter().position(|held| held == value) {
            list.remove(pos);
        }
        let key = norm(value);
        if !list.iter().any(|held| norm(held) == key) {
            idx.remove(&key, id);
        }
    }
}

/// Borrowed read capability over the store. Holds the shared lock for its
/// lifetime; every accessor observes one writer-quiescent state.
pub struct Snapshot<'a> {
    state: RwLockReadGuard<'a, DumpState>,
    metrics: &'a Metrics,
}

impl Snapshot<'_> {
    pub fn get(&self, id: ContentId) -> Option<&Entry> {
        self.state.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.entries.is_empty()
    }

    pub fn update_time(&self) -> i64 {
        self.state.update_time
    }

    pub fn lookup_ip4(&self, addr: Ipv4Addr) -> Vec<LookupMatch> {
        let key = u32::from(addr);
        self.collect(self.state.ip4_idx.get(&key), addr.to_string())
    }

    pub fn lookup_ip6(&self, addr: Ipv6Addr) -> Vec<LookupMatch> {
        self.collect(self.state.ip6_idx.get(&addr), addr.to_string())
    }

    pub fn lookup_subnet4(&self, subnet: &str) -> Vec<LookupMatch> {
        let key = normalize_subnet(subnet);
        self.collect(self.state.subnet4_idx.get(&key), key.clone())
    }

    pub fn lookup_subnet6(&self, subnet: &str) -> Vec<LookupMatch> {
        let key = normalize_subnet(subnet);
        self.collect(self.state.subnet6_idx.get(&key), key.clone())
    }

    pub fn lookup_domain(&self, domain: &str) -> Vec<LookupMatch> {
        let key = normalize_domain(domain);
        self.collect(self.state.domain_idx.get(&key), key.clone())
    }

    pub fn lookup_url(&self, url: &str) -> Vec<LookupMatch> {
        let key = normalize_url(url);
        self.collect(self.state.url_idx.get(&key), key.clone())
    }

    pub fn lookup_decision(&self, org: &str, number: &str, date: &str) -> Vec<LookupMatch> {
        let hash = decision_fingerprint(org, number, date);
        self.collect(
            self.state.decision_idx.get(&hash),
            format!("{org} {number} {date}"),
        )
    }

    fn collect(&self, set: Option<&IdSet>, matched_value: String) -> Vec<LookupMatch> {
        self.metrics.record_query();
        let Some(set) = set else {
            return Vec::new();
        };
        let mut matches: Vec<LookupMatch> = set
            .iter()
            .filter_map(|id| self.state.entries.get(&id))
            .map(|entry| LookupMatch {
                id: entry.id,
                block_type: entry.block_type,
                registry_update_time: entry.registry_update_time,
                matched_value: matched_value.clone(),
                payload: entry.payload.clone(),
            })
            .collect();
        matches.sort_by_key(|m| m.id);
        matches
    }

    /// Cross-check the list/index invariants. A violation is a defect of
    /// this crate, never of the input dump.
    pub fn verify_invariants(&self) -> Result<()> {
        let state = &*self.state;

        for entry in state.entries.values() {
            for v in &entry.ip4 {
                require_indexed(state.ip4_idx.get(&v.addr), entry.id, "ip4")?;
            }
            for v in &entry.ip6 {
                require_indexed(state.ip6_idx.get(&v.addr), entry.id, "ip6")?;
            }
            for v in &entry.subnet4 {
                require_indexed(state.subnet4_idx.get(&v.subnet), entry.id, "subnet4")?;
            }
            for v in &entry.subnet6 {
                require_indexed(state.subnet6_idx.get(&v.subnet), entry.id, "subnet6")?;
            }
            for v in &entry.domain {
                require_indexed(
                    state.domain_idx.get(&normalize_domain(&v.domain)),
                    entry.id,
                    "domain",
                )?;
            }
            for v in &entry.url {
                require_indexed(state.url_idx.get(&normalize_url(&v.url)), entry.id, "url")?;
            }
            require_indexed(
                state.decision_idx.get(&entry.decision_hash),
                entry.id,
                "decision",
            )?;
        }

        check_index(&state.ip4_idx, state, "ip4", |entry, key| {
            entry.ip4.iter().any(|v| v.addr == *key)
        })?;
        check_index(&state.ip6_idx, state, "ip6", |entry, key| {
            entry.ip6.iter().any(|v| v.addr == *key)
        })?;
        check_index(&state.subnet4_idx, state, "subnet4", |entry, key| {
            entry.subnet4.iter().any(|v| v.subnet == *key)
        })?;
        check_index(&state.subnet6_idx, state, "subnet6", |entry, key| {
            entry.subnet6.iter().any(|v| v.subnet == *key)
        })?;
        check_index(&state.domain_idx, state, "domain", |entry, key| {
            entry.domain.iter().any(|v| normalize_domain(&v.domain) == *key)
        })?;
        check_index(&state.url_idx, state, "url", |entry, key| {
            entry.url.iter().any(|v| normalize_url(&v.url) == *key)
        })?;
        check_index(&state.decision_idx, state, "decision", |entry, key| {
            entry.decision_hash == *key
        })?;

        Ok(())
    }
}

fn require_indexed(set: Option<&IdSet>, id: ContentId, index: &str) -> Result<()> {
    match set {
        Some(set) if set.contains(id) => Ok(()),
        _ => Err(Error::Internal {
            message: format!("entry {id} missing from {index} index"),
        }),
    }
}

fn check_index<K: Eq + Hash>(
    idx: &ResourceIndex<K>,
    state: &DumpState,
    name: &str,
    holds: impl Fn(&Entry, &K) -> bool,
) -> Result<()> {
    for (key, set) in idx.iter() {
        if set.is_empty() {
            return Err(Error::Internal {
                message: format!("empty id set left in {name} index"),
            });
        }
        for id in set.iter() {
            let entry = state.entries.get(&id).ok_or_else(|| Error::Internal {
                message: format!("dangling id {id} in {name} index"),
            })?;
            if !holds(entry, key) {
                return Err(Error::Internal {
                    message: format!("entry {id} does not hold its {name} key"),
                });
            }
        }
    }
    Ok(())
}
