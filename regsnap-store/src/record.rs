//! Decoding of one captured `<content>…</content>` slice into the record
//! model, and the canonical JSON payload derived from it.
//!
//! Value-level parse failures (a malformed IP literal) drop the affected
//! resource and are counted on the record; any structural failure is a
//! record decode error and skips the whole record.

use std::fmt::Display;
use std::net::Ipv6Addr;

use bytes::Bytes;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use tracing::warn;

use regsnap_core::error::{Error, Result};
use regsnap_core::normalize::{
    is_https, normalize_subnet, normalize_url, parse_ip4, parse_ip6, parse_moscow_time,
    parse_rfc3339,
};
use regsnap_core::ContentId;

/// The legal authorization tuple behind a block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Decision {
    pub org: String,
    pub number: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlResource {
    pub url: String,
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainResource {
    pub domain: String,
    pub ts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ip4Resource {
    /// Big-endian 32-bit address value.
    pub addr: u32,
    pub ts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ip6Resource {
    pub addr: Ipv6Addr,
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetResource {
    pub subnet: String,
    pub ts: i64,
}

/// One registry record, decoded from its raw XML slice.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: ContentId,
    pub entry_type: i32,
    pub urgency_type: i32,
    /// Moscow-local `includeTime`, as Unix seconds.
    pub include_time: i64,
    /// Raw `blockType` attribute; the derived enum lives on the entry.
    pub block_type: String,
    /// Registry-provided hash attribute. Stored, not used for change
    /// detection; the byte fingerprint is.
    pub hash: String,
    pub ts: i64,
    pub decision: Decision,
    pub url: Vec<UrlResource>,
    pub domain: Vec<DomainResource>,
    pub ip4: Vec<Ip4Resource>,
    pub ip6: Vec<Ip6Resource>,
    pub subnet4: Vec<SubnetResource>,
    pub subnet6: Vec<SubnetResource>,
    /// Resources dropped by value-level parse failures.
    #[serde(skip)]
    pub dropped_values: u32,
}

impl Record {
    /// Decode the exact byte range of one `<content>` element.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(raw);
        let mut record = Record::default();
        let mut saw_content = false;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf).map_err(decode_err)? {
                Event::Start(e) => {
                    let name = e.name().as_ref().to_vec();
                    match name.as_slice() {
                        b"content" => {
                            parse_content_attrs(&e, &mut record)?;
                            saw_content = true;
                        }
                        b"decision" => parse_decision_attrs(&e, &mut record.decision)?,
                        b"url" | b"domain" | b"ip" | b"ipv6" | b"ipSubnet" | b"ipv6Subnet" => {
                            let ts = ts_attr(&e)?;
                            let text = read_element_text(&mut reader, &name)?;
                            record.push_resource(&name, text, ts);
                        }
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    let name = e.name().as_ref().to_vec();
                    match name.as_slice() {
                        b"content" => {
                            parse_content_attrs(&e, &mut record)?;
                            saw_content = true;
                        }
                        b"decision" => parse_decision_attrs(&e, &mut record.decision)?,
                        b"url" | b"domain" | b"ip" | b"ipv6" | b"ipSubnet" | b"ipv6Subnet" => {
                            let ts = ts_attr(&e)?;
                            record.push_resource(&name, String::new(), ts);
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_content {
            return Err(Error::RecordDecode {
                message: "missing <content> element".to_string(),
            });
        }

        Ok(record)
    }

    /// Canonical JSON bytes of the decoded record. Opaque to all indexes.
    pub fn to_payload(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// URLs whose canonical form carries the https scheme.
    pub fn https_url_count(&self) -> usize {
        self.url
            .iter()
            .filter(|u| is_https(&normalize_url(&u.url)))
            .count()
    }

    fn push_resource(&mut self, name: &[u8], text: String, ts: i64) {
        match name {
            b"url" => self.url.push(UrlResource { url: text, ts }),
            b"domain" => self.domain.push(DomainResource { domain: text, ts }),
            b"ip" => match parse_ip4(&text) {
                Ok(addr) => self.ip4.push(Ip4Resource { addr, ts }),
                Err(err) => {
                    warn!(id = self.id, %err, "dropping malformed ip resource");
                    self.dropped_values += 1;
                }
            },
            b"ipv6" => match parse_ip6(&text) {
                Ok(addr) => self.ip6.push(Ip6Resource { addr, ts }),
                Err(err) => {
                    warn!(id = self.id, %err, "dropping malformed ipv6 resource");
                    self.dropped_values += 1;
                }
            },
            b"ipSubnet" => self.subnet4.push(SubnetResource {
                subnet: normalize_subnet(&text),
                ts,
            }),
            b"ipv6Subnet" => self.subnet6.push(SubnetResource {
                subnet: normalize_subnet(&text),
                ts,
            }),
            _ => unreachable!("filtered by caller"),
        }
    }
}

fn decode_err<E: Display>(err: E) -> Error {
    Error::RecordDecode {
        message: err.to_string(),
    }
}

fn parse_content_attrs(element: &BytesStart<'_>, record: &mut Record) -> Result<()> {
    let mut has_id = false;

    for attr in element.attributes() {
        let attr = attr.map_err(decode_err)?;
        let value = attr.unescape_value().map_err(decode_err)?;
        match attr.key.as_ref() {
            b"id" => {
                record.id = value.parse().map_err(|err| Error::RecordDecode {
                    message: format!("id attribute {value:?}: {err}"),
                })?;
                has_id = true;
            }
            b"entryType" => {
                record.entry_type = value.parse().map_err(|err| Error::RecordDecode {
                    message: format!("entryType attribute {value:?}: {err}"),
                })?;
            }
            b"urgencyType" => {
                record.urgency_type = value.parse().map_err(|err| Error::RecordDecode {
                    message: format!("urgencyType attribute {value:?}: {err}"),
                })?;
            }
            b"includeTime" => record.include_time = parse_moscow_time(&value),
            b"blockType" => record.block_type = value.into_owned(),
            b"hash" => record.hash = value.into_owned(),
            b"ts" => record.ts = parse_rfc3339(&value),
            _ => {}
        }
    }

    if !has_id {
        return Err(Error::RecordDecode {
            message: "content element without id attribute".to_string(),
        });
    }
    Ok(())
}

fn parse_decision_attrs(element: &BytesStart<'_>, decision: &mut Decision) -> Result<()> {
    for attr in element.attributes() {
        let attr = attr.map_err(decode_err)?;
        let value = attr.unescape_value().map_err(decode_err)?;
        match attr.key.as_ref() {
            b"org" => decision.org = value.into_owned(),
            b"number" => decision.number = value.into_owned(),
            b"date" => decision.date = value.into_owned(),
            _ => {}
        }
    }
    Ok(())
}

fn ts_attr(element: &BytesStart<'_>) -> Result<i64> {
    for attr in element.attributes() {
        let attr = attr.map_err(decode_err)?;
        if attr.key.as_ref() == b"ts" {
            let value = attr.unescape_value().map_err(decode_err)?;
            return Ok(parse_rfc3339(&value));
        }
    }
    Ok(0)
}

fn read_element_text(reader: &mut Reader<&[u8]>, end_name: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).map_err(decode_err)? {
            Event::Text(t) => out.push_str(&t.unescape().map_err(decode_err)?),
            Event::CData(t) => out.push_str(std::str::from_utf8(&t).map_err(decode_err)?),
            Event::End(e) if e.name().as_ref() == end_name => break,
            Event::Eof => {
                return Err(Error::RecordDecode {
                    message: "truncated record".to_string(),
                })
            }
            _ => {}
        }
    }
    Ok(out)
}
