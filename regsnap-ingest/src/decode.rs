//! Charset-transcoding tee reader and the writer-local scratch buffer.
//!
//! The dump announces its character set in the XML prolog. The tokenizer
//! must see UTF-8, and the fingerprinting path needs the exact decoded
//! bytes of every record, so this reader transcodes on the way in and
//! tees each decoded chunk into a scratch buffer the parser drains as it
//! advances. The transcoder is installed before the first byte reaches
//! the tokenizer, so tokenizer offsets and scratch offsets share origin
//! zero and no offset correction is required.

use std::cell::RefCell;
use std::io::{self, BufRead, Read};
use std::rc::Rc;

use bytes::{Buf, Bytes, BytesMut};
use encoding_rs::{CoderResult, Decoder, Encoding};

const SNIFF_LEN: usize = 1024;
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Decoded-byte window between the tee and the tokenizer, addressed by
/// absolute stream offset.
pub(crate) struct ScratchBuffer {
    buf: BytesMut,
    start: u64,
}

pub(crate) type ScratchHandle = Rc<RefCell<ScratchBuffer>>;

impl ScratchBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            start: 0,
        }
    }

    pub(crate) fn handle(capacity: usize) -> ScratchHandle {
        Rc::new(RefCell::new(Self::with_capacity(capacity)))
    }

    fn append(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Absolute offset one past the last buffered byte.
    pub(crate) fn end(&self) -> u64 {
        self.start + self.buf.len() as u64
    }

    /// Drop everything before `offset`.
    pub(crate) fn discard_to(&mut self, offset: u64) {
        debug_assert!(offset >= self.start, "scratch drained past a live slice");
        let len = offset
            .saturating_sub(self.start)
            .min(self.buf.len() as u64) as usize;
        self.buf.advance(len);
        self.start += len as u64;
    }

    /// Split off the bytes in `[start, offset)`.
    pub(crate) fn take_to(&mut self, offset: u64) -> Bytes {
        debug_assert!(offset >= self.start && offset <= self.end());
        let len = offset
            .saturating_sub(self.start)
            .min(self.buf.len() as u64) as usize;
        let slice = self.buf.split_to(len).freeze();
        self.start += len as u64;
        slice
    }
}

/// `BufRead` adapter handing the tokenizer UTF-8 and teeing every decoded
/// byte into the scratch buffer.
pub(crate) struct TeeDecodeReader<R: Read> {
    inner: R,
    decoder: Option<Decoder>,
    raw: Vec<u8>,
    raw_pos: usize,
    out: Vec<u8>,
    out_pos: usize,
    read_chunk: usize,
    scratch: ScratchHandle,
    eof: bool,
    decode_done: bool,
}

impl<R: Read> TeeDecodeReader<R> {
    pub(crate) fn new(mut inner: R, read_chunk: usize, scratch: ScratchHandle) -> io::Result<Self> {
        // Sniff the prolog before handing anything to the tokenizer.
        let mut raw = Vec::with_capacity(SNIFF_LEN);
        let mut probe = [0u8; 256];
        let mut eof = false;
        while !raw.contains(&b'>') && raw.len() < SNIFF_LEN {
            let n = inner.read(&mut probe)?;
            if n == 0 {
                eof = true;
                break;
            }
            raw.extend_from_slice(&probe[..n]);
        }

        let decoder = detect_encoding(&raw).map(Encoding::new_decoder);
        let mut reader = Self {
            inner,
            decoder,
            raw,
            raw_pos: 0,
            out: Vec::new(),
            out_pos: 0,
            read_chunk: read_chunk.max(256),
            scratch,
            eof,
            decode_done: false,
        };
        // In passthrough mode a UTF-8 BOM would desynchronize tokenizer
        // and scratch offsets; drop it before the first token.
        if reader.decoder.is_none() && reader.raw.starts_with(&UTF8_BOM) {
            reader.raw_pos = UTF8_BOM.len();
        }
        Ok(reader)
    }

    fn refill(&mut self) -> io::Result<()> {
        self.out.clear();
        self.out_pos = 0;

        while self.out.is_empty() {
            if self.raw_pos == self.raw.len() && !self.eof {
                self.raw.resize(self.read_chunk, 0);
                let n = self.inner.read(&mut self.raw)?;
                self.raw.truncate(n);
                self.raw_pos = 0;
                if n == 0 {
                    self.eof = true;
                }
            }

            let src = &self.raw[self.raw_pos..];
            match self.decoder.as_mut() {
                None => {
                    if src.is_empty() {
                        break;
                    }
                    self.out.extend_from_slice(src);
                    self.raw_pos += src.len();
                }
                Some(decoder) => {
                    if self.decode_done {
                        break;
                    }
                    let last = self.eof;
                    let mut dst = vec![0u8; src.len().saturating_mul(3) + 32];
                    let (result, read, written, _had_errors) =
                        decoder.decode_to_utf8(src, &mut dst, last);
                    self.raw_pos += read;
                    self.out.extend_from_slice(&dst[..written]);
                    if last && matches!(result, CoderResult::InputEmpty) {
                        self.decode_done = true;
                        break;
                    }
                }
            }
        }

        if !self.out.is_empty() {
            self.scratch.borrow_mut().append(&self.out);
        }
        Ok(())
    }
}

impl<R: Read> Read for TeeDecodeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for TeeDecodeReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.out_pos >= self.out.len() {
            self.refill()?;
        }
        Ok(&self.out[self.out_pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.out_pos = (self.out_pos + amt).min(self.out.len());
    }
}

/// Charset announced by BOM or prolog, if it requires transcoding.
fn detect_encoding(prefix: &[u8]) -> Option<&'static Encoding> {
    if let Some((encoding, _)) = Encoding::for_bom(prefix) {
        return if encoding == encoding_rs::UTF_8 {
            None
        } else {
            Some(encoding)
        };
    }
    if !prefix.starts_with(b"<?xml") {
        return None;
    }
    let label = declared_label(prefix)?;
    let encoding = Encoding::for_label(label)?;
    if encoding == encoding_rs::UTF_8 {
        None
    } else {
        Some(encoding)
    }
}

/// Value of the `encoding` pseudo-attribute in the XML declaration.
fn declared_label(prefix: &[u8]) -> Option<&[u8]> {
    let decl_end = prefix.iter().position(|&b| b == b'>').unwrap_or(prefix.len());
    let decl = &prefix[..decl_end];
    let pos = decl.windows(8).position(|w| w == b"encoding")?;

    let mut i = pos + 8;
    while i < decl.len() && decl[i].is_ascii_whitespace() {
        i += 1;
    }
    if decl.get(i) != Some(&b'=') {
        return None;
    }
    i += 1;
    while i < decl.len() && decl[i].is_ascii_whitespace() {
        i += 1;
    }
    let quote = *decl.get(i)?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    i += 1;
    let start = i;
    while i < decl.len() && decl[i] != quote {
        i += 1;
    }
    if i >= decl.len() {
        return None;
    }
    Some(&decl[start..i])
}
