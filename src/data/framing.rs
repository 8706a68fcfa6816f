// src/data/framing.rs

//! Implements the rawlog framing: a 4-byte big-endian length prefix followed
//! by that many bytes of UTF-8 JSON object.
//!
//! Encoding is done by [`encode_record`] and [`write_record`].
//! Decoding is done by a [`FrameDecoder`] which reads from any [`Read`] and
//! recovers from corrupted length prefixes.
//!
//! ## Decoding
//!
//! * fewer than 4 bytes remaining is a clean end of stream.
//! * a length of `0` is a legacy marker and is skipped.
//! * a length greater than the maximum record length (`2^20`) is a corrupted
//!   prefix. The decoder scans forward, byte by byte, starting one byte after
//!   the corrupted prefix, for the next plausible prefix: the high 16 bits
//!   are at most `max_len >> 16`, the whole length is within
//!   `1..=max_len`, and the payload begins with `{`. The skipped region is
//!   reported as one [`Decoded::Corruption`].
//! * a valid length with fewer payload bytes remaining is a truncated file
//!   and a hard error.
//! * a payload that is not a JSON object is reported as
//!   [`Decoded::Lost`]; decoding continues at the next prefix.
//!
//! [`Read`]: std::io::Read

use crate::common::{Bytes, Count, FileOffset, ResultS3};
use crate::data::record::{Fields, RESERVED_FIELD_SEQ, RESERVED_FIELD_VIRTUAL};
use crate::debug::printers::buffer_to_string_noraw;
#[allow(unused_imports)]
use crate::{de_err, de_wrn, e_err, e_wrn};

use std::fmt;
use std::io::{Error, ErrorKind, Read, Result, Write};

#[allow(unused_imports)]
use ::more_asserts::{debug_assert_ge, debug_assert_le};
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};
use ::serde_json::Value;

/// Size of the length prefix in bytes.
pub const LEN_PREFIX_SZ: usize = 4;

/// Byte every JSON object payload begins with.
const PAYLOAD_FIRST_BYTE: u8 = b'{';

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// encoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Encode `fields` as one frame: length prefix + JSON.
///
/// The reserved runtime fields are never written. A JSON encoding longer
/// than `max_len` is refused with `InvalidInput`; it could never be read
/// back.
pub fn encode_record(
    fields: &Fields,
    max_len: u32,
) -> Result<Bytes> {
    let json: Bytes = if fields.contains_key(RESERVED_FIELD_SEQ)
        || fields.contains_key(RESERVED_FIELD_VIRTUAL)
    {
        let mut fields_ = fields.clone();
        fields_.retain(|name, _| name != RESERVED_FIELD_SEQ && name != RESERVED_FIELD_VIRTUAL);
        serde_json::to_vec(&fields_)?
    } else {
        serde_json::to_vec(fields)?
    };
    if json.len() > max_len as usize {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("record JSON is {} bytes, larger than maximum {}", json.len(), max_len),
        ));
    }
    let mut buffer: Bytes = Bytes::with_capacity(LEN_PREFIX_SZ + json.len());
    buffer.extend_from_slice(&(json.len() as u32).to_be_bytes());
    buffer.extend_from_slice(&json);

    Ok(buffer)
}

/// Encode and write one frame. Returns the number of bytes written.
pub fn write_record<W: Write + ?Sized>(
    writer: &mut W,
    fields: &Fields,
    max_len: u32,
) -> Result<usize> {
    let buffer = encode_record(fields, max_len)?;
    writer.write_all(&buffer)?;

    Ok(buffer.len())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One item decoded by [`FrameDecoder::decode`].
#[derive(Debug, PartialEq)]
pub enum Decoded {
    /// A well-formed record.
    Record(Fields),
    /// A corrupted region starting at `offset` was skipped.
    Corruption {
        skipped: u64,
        offset: FileOffset,
    },
    /// A frame at `offset` had a valid length but its payload was not a JSON
    /// object.
    Lost {
        offset: FileOffset,
        len: u32,
    },
}

/// A typed [`ResultS3`] for function [`FrameDecoder::decode`].
///
/// [`ResultS3`]: crate::common::ResultS3
pub type ResultS3Decode = ResultS3<Decoded, Error>;

/// Statistics about a [`FrameDecoder`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SummaryFrameDecoder {
    pub records: Count,
    pub zero_len_markers: Count,
    pub lost: Count,
    pub resyncs: Count,
    pub bytes_skipped: Count,
}

/// Decodes frames from a byte stream.
///
/// The stream need not be seekable; the decoder keeps its own lookahead
/// buffer so a resync may re-examine bytes of a corrupted prefix.
pub struct FrameDecoder<R: Read> {
    reader: R,
    /// Lookahead buffer. Bytes before `at` are consumed.
    buffer: Bytes,
    /// Index into `buffer` of the next unconsumed byte.
    at: usize,
    /// Stream offset of `buffer[at]`.
    offset: FileOffset,
    /// `reader` returned zero bytes.
    eof: bool,
    max_len: u32,
    summary: SummaryFrameDecoder,
}

impl<R: Read> fmt::Debug for FrameDecoder<R> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("offset", &self.offset)
            .field("buffered", &self.available())
            .field("eof", &self.eof)
            .field("max_len", &self.max_len)
            .field("summary", &self.summary)
            .finish()
    }
}

impl<R: Read> FrameDecoder<R> {
    /// Bytes requested from the `reader` per `read` call.
    const READ_SZ: usize = 0x10000;

    pub fn new(
        reader: R,
        max_len: u32,
    ) -> FrameDecoder<R> {
        FrameDecoder {
            reader,
            buffer: Bytes::with_capacity(FrameDecoder::<R>::READ_SZ),
            at: 0,
            offset: 0,
            eof: false,
            max_len,
            summary: SummaryFrameDecoder::default(),
        }
    }

    /// Stream offset of the next unconsumed byte, i.e. bytes consumed so far.
    #[inline(always)]
    pub fn offset(&self) -> FileOffset {
        self.offset
    }

    pub fn summary(&self) -> SummaryFrameDecoder {
        self.summary
    }

    /// Return the underlying reader. Buffered, unconsumed bytes are lost.
    pub fn into_inner(self) -> R {
        self.reader
    }

    #[inline(always)]
    fn available(&self) -> usize {
        self.buffer.len() - self.at
    }

    #[inline(always)]
    fn consume(
        &mut self,
        n: usize,
    ) {
        debug_assert_le!(n, self.available(), "consume {} more than available", n);
        self.at += n;
        self.offset += n as FileOffset;
    }

    /// Read until at least `want` bytes are available or the reader is
    /// exhausted. Returns the count of available bytes.
    fn fill(
        &mut self,
        want: usize,
    ) -> Result<usize> {
        while self.available() < want && !self.eof {
            if self.at > 0 {
                self.buffer.drain(..self.at);
                self.at = 0;
            }
            let len_old = self.buffer.len();
            let read_sz = std::cmp::max(FrameDecoder::<R>::READ_SZ, want - len_old);
            self.buffer.resize(len_old + read_sz, 0);
            match self.reader.read(&mut self.buffer[len_old..]) {
                Ok(0) => {
                    defo!("reader.read() returned 0; EOF at offset {}", self.offset + len_old as FileOffset);
                    self.buffer.truncate(len_old);
                    self.eof = true;
                }
                Ok(n) => {
                    self.buffer.truncate(len_old + n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {
                    self.buffer.truncate(len_old);
                }
                Err(err) => {
                    self.buffer.truncate(len_old);
                    return Err(err);
                }
            }
        }

        Ok(self.available())
    }

    /// Decode the next item.
    ///
    /// Returns `Done` at a clean end of stream, `Err` for a truncated payload
    /// or an I/O error.
    pub fn decode(&mut self) -> ResultS3Decode {
        loop {
            let offset_prefix: FileOffset = self.offset;
            let avail = match self.fill(LEN_PREFIX_SZ) {
                Ok(val) => val,
                Err(err) => return ResultS3Decode::Err(err),
            };
            if avail < LEN_PREFIX_SZ {
                if avail > 0 {
                    de_wrn!("ignoring {} trailing bytes at offset {}", avail, offset_prefix);
                    self.consume(avail);
                }
                defñ!("Done at offset {}", self.offset);
                return ResultS3Decode::Done;
            }
            let b = &self.buffer[self.at..self.at + LEN_PREFIX_SZ];
            let len: u32 = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
            if len == 0 {
                self.consume(LEN_PREFIX_SZ);
                self.summary.zero_len_markers += 1;
                continue;
            }
            if len > self.max_len {
                defo!("length {} at offset {} exceeds {}; resync", len, offset_prefix, self.max_len);
                return match self.resync(offset_prefix) {
                    Ok(decoded) => ResultS3Decode::Found(decoded),
                    Err(err) => ResultS3Decode::Err(err),
                };
            }
            let want: usize = LEN_PREFIX_SZ + len as usize;
            let avail = match self.fill(want) {
                Ok(val) => val,
                Err(err) => return ResultS3Decode::Err(err),
            };
            if avail < want {
                return ResultS3Decode::Err(Error::new(
                    ErrorKind::InvalidData,
                    format!(
                        "corrupt file: record at offset {} declares {} bytes but only {} bytes remain",
                        offset_prefix,
                        len,
                        avail - LEN_PREFIX_SZ,
                    ),
                ));
            }
            let payload = &self.buffer[self.at + LEN_PREFIX_SZ..self.at + want];
            let decoded: Decoded = match serde_json::from_slice::<Value>(payload) {
                Ok(Value::Object(map)) => {
                    self.summary.records += 1;
                    Decoded::Record(map)
                }
                Ok(_value) => {
                    e_wrn!(
                        "lost record at offset {}: payload is JSON but not an object: {}",
                        offset_prefix,
                        buffer_to_string_noraw(payload),
                    );
                    self.summary.lost += 1;
                    Decoded::Lost { offset: offset_prefix, len }
                }
                Err(err) => {
                    e_wrn!(
                        "lost record at offset {}: {}: {}",
                        offset_prefix,
                        err,
                        buffer_to_string_noraw(payload),
                    );
                    self.summary.lost += 1;
                    Decoded::Lost { offset: offset_prefix, len }
                }
            };
            self.consume(want);

            return ResultS3Decode::Found(decoded);
        }
    }

    /// `true` if the bytes at `self.at` could be the start of a valid frame.
    fn is_plausible_prefix(&self) -> bool {
        let b = &self.buffer[self.at..self.at + LEN_PREFIX_SZ + 1];
        let high: u32 = u16::from_be_bytes([b[0], b[1]]) as u32;
        if high > (self.max_len >> 16) {
            return false;
        }
        let len: u32 = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);

        len >= 1 && len <= self.max_len && b[LEN_PREFIX_SZ] == PAYLOAD_FIRST_BYTE
    }

    /// Skip forward from the corrupted prefix at `offset_prefix` (which is
    /// `self.offset`) to the next plausible prefix, or to the end of the
    /// stream.
    fn resync(
        &mut self,
        offset_prefix: FileOffset,
    ) -> Result<Decoded> {
        defn!("({})", offset_prefix);
        debug_assert_eq!(offset_prefix, self.offset);
        self.consume(1);
        loop {
            let avail = self.fill(LEN_PREFIX_SZ + 1)?;
            if avail < LEN_PREFIX_SZ + 1 {
                self.consume(avail);
                defo!("no valid prefix before end of stream");
                break;
            }
            if self.is_plausible_prefix() {
                break;
            }
            self.consume(1);
        }
        let skipped: u64 = self.offset - offset_prefix;
        self.summary.resyncs += 1;
        self.summary.bytes_skipped += skipped;
        e_wrn!("corrupted data at offset {}; skipped {} bytes", offset_prefix, skipped);
        defx!("skipped {}, resume at offset {}", skipped, self.offset);

        Ok(Decoded::Corruption { skipped, offset: offset_prefix })
    }
}
