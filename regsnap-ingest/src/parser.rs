//! # Streaming Dump Parser
//!
//! Single-pass ingest of the registry dump. Each `<content>` element is
//! skipped at the token level, its exact byte range recovered from the
//! scratch buffer and fingerprinted, and only records whose fingerprint
//! diverges from the held state are decoded. The per-refresh journal of
//! seen ids drives the post-refresh sweep.

use std::io::Read;
use std::rc::Rc;
use std::sync::Arc;

use fnv::FnvHashSet;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{info, warn};

use regsnap_core::config::IngestConfig;
use regsnap_core::error::{Error, Result};
use regsnap_core::fingerprint::record_fingerprint;
use regsnap_core::normalize::parse_rfc3339;
use regsnap_core::ContentId;
use regsnap_store::{DumpStore, UpsertOutcome};

use crate::decode::{ScratchBuffer, TeeDecodeReader};

/// Attributes of the dump's `<register>` envelope.
#[derive(Debug, Clone, Default)]
pub struct RegisterMeta {
    pub format_version: String,
    /// Global refresh timestamp, Unix seconds.
    pub update_time: i64,
    pub update_time_urgently: String,
}

/// Statistics of one refresh.
#[derive(Debug, Clone, Default)]
pub struct RefreshStats {
    /// Records processed, decode failures included.
    pub records: u64,
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub decode_errors: u64,
    /// Largest raw `<content>` slice observed, in bytes.
    pub max_content_size: usize,
    /// Largest id set across the resource indexes after the sweep.
    pub max_idset_len: usize,
    pub register: RegisterMeta,
}

/// Ingest one dump stream into the store.
///
/// Holds the write capability per record; a reader between two records
/// observes a consistent prefix of the refresh. Framing and I/O errors
/// abort the refresh and leave all committed mutations in place.
pub fn parse_dump<R: Read>(
    input: R,
    store: &DumpStore,
    config: &IngestConfig,
) -> Result<RefreshStats> {
    let scratch = ScratchBuffer::handle(config.scratch_capacity);
    let tee = TeeDecodeReader::new(input, config.read_chunk, Rc::clone(&scratch))?;
    let mut reader = Reader::from_reader(tee);

    let mut register = RegisterMeta::default();
    let mut stats = RefreshStats::default();
    let mut journal: FnvHashSet<ContentId> =
        FnvHashSet::with_capacity_and_hasher(store.entry_count().max(16), Default::default());

    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();

    loop {
        let token_start = reader.buffer_position() as u64;
        scratch.borrow_mut().discard_to(token_start);

        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"register" => parse_register(&e, &mut register)?,
                b"content" => {
                    let id = content_id(&e);

                    // Skip to the matching close without decoding the body.
                    let end = e.to_end().into_owned();
                    skip_buf.clear();
                    reader
                        .read_to_end_into(end.name(), &mut skip_buf)
                        .map_err(xml_err)?;

                    let token_end = reader.buffer_position() as u64;
                    let raw = scratch.borrow_mut().take_to(token_end);
                    stats.records += 1;
                    if stats.max_content_size < raw.len() {
                        stats.max_content_size = raw.len();
                    }

                    let Some(id) = id else {
                        store.metrics().record_decode_error();
                        stats.decode_errors += 1;
                        continue;
                    };

                    // Journal regardless of the upsert outcome so a
                    // decode failure preserves the held entry across the
                    // sweep.
                    journal.insert(id);

                    let fingerprint = record_fingerprint(raw.as_ref());
                    match store.upsert(id, raw.as_ref(), fingerprint, register.update_time) {
                        Ok(UpsertOutcome::Added) => stats.added += 1,
                        Ok(UpsertOutcome::Updated) => stats.updated += 1,
                        Ok(UpsertOutcome::Unchanged) => {}
                        Err(err) if err.is_recoverable() => {
                            warn!(id, %err, "skipping undecodable record");
                            stats.decode_errors += 1;
                        }
                        Err(err) => return Err(err),
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"register" => {
                parse_register(&e, &mut register)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(xml_err(err)),
        }
    }

    stats.removed = store.sweep(&journal, register.update_time) as u64;

    let store_stats = store.stats();
    stats.max_idset_len = store_stats.max_idset_len;
    stats.register = register;

    store
        .metrics()
        .record_refresh(stats.records, stats.added, stats.updated, stats.removed);

    info!(
        records = stats.records,
        added = stats.added,
        updated = stats.updated,
        removed = stats.removed,
        "dump refresh applied"
    );
    info!(
        ip4 = store_stats.ip4_keys,
        ip6 = store_stats.ip6_keys,
        subnet4 = store_stats.subnet4_keys,
        subnet6 = store_stats.subnet6_keys,
        domain = store_stats.domain_keys,
        url = store_stats.url_keys,
        "index sizes"
    );
    info!(
        max_idset = stats.max_idset_len,
        max_content = stats.max_content_size,
        "refresh extremes"
    );

    Ok(stats)
}

/// Async facade: run one refresh as the dedicated writer task while
/// readers keep serving queries from other tasks.
pub async fn refresh<R>(
    input: R,
    store: Arc<DumpStore>,
    config: IngestConfig,
) -> Result<RefreshStats>
where
    R: Read + Send + 'static,
{
    tokio::task::spawn_blocking(move || parse_dump(input, &store, &config))
        .await
        .map_err(|err| Error::Internal {
            message: format!("refresh task failed: {err}"),
        })?
}

fn parse_register(element: &BytesStart<'_>, register: &mut RegisterMeta) -> Result<()> {
    for attr in element.attributes() {
        let attr = attr.map_err(|err| Error::Xml {
            message: err.to_string(),
        })?;
        let value = attr.unescape_value().map_err(|err| Error::Xml {
            message: err.to_string(),
        })?;
        match attr.key.as_ref() {
            b"formatVersion" => register.format_version = value.into_owned(),
            b"updateTime" => register.update_time = parse_rfc3339(&value),
            b"updateTimeUrgently" => register.update_time_urgently = value.into_owned(),
            _ => {}
        }
    }
    Ok(())
}

/// The `id` attribute of a `<content>` start tag, read before the body is
/// skipped. Anything unparsable skips the record.
fn content_id(element: &BytesStart<'_>) -> Option<ContentId> {
    for attr in element.attributes().flatten() {
        if attr.key.as_ref() == b"id" {
            let value = attr.unescape_value().ok()?;
            return match value.parse() {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!(value = %value, %err, "content id attribute unparsable");
                    None
                }
            };
        }
    }
    warn!("content element without a readable id attribute");
    None
}

fn xml_err(err: quick_xml::Error) -> Error {
    match err {
        quick_xml::Error::Io(source) => Error::Io {
            message: source.to_string(),
            source: std::io::Error::new(source.kind(), source.to_string()),
        },
        other => Error::Xml {
            message: other.to_string(),
        },
    }
}
