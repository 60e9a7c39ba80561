// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Incremental MessagePack record decoding.
//!
//! Decompressed fragments are appended to a backlog. Record boundaries are
//! found by walking MessagePack markers and length prefixes
//! ([`frame_len`]) without building values; only complete frames are handed
//! to `rmpv` for decoding. Fragment boundaries never need to line up with
//! record boundaries.

use crate::error::{Error, Result};
use crate::types::Record;
use bytes::{Buf, BytesMut};

/// Unwrap a length prefix, or report that more bytes are needed.
macro_rules! try_len {
    ($e:expr) => {
        match $e {
            Some(n) => n,
            None => return Ok(None),
        }
    };
}

/// Length in bytes of the first complete MessagePack value in `buf`.
///
/// Returns `Ok(None)` when `buf` holds only a prefix of a value. Nested
/// arrays and maps are walked iteratively, so deeply nested input cannot
/// exhaust the stack.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>> {
    FrameScan::default().resume(buf)
}

/// Resumable position of a framing scan over a growing buffer.
///
/// Progress is committed after each complete marker, so a scan that ran out
/// of bytes picks up at the last element boundary instead of at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameScan {
    pos: usize,
    /// values still to be read before the outermost one is complete
    pending: u64,
}

impl Default for FrameScan {
    fn default() -> Self {
        Self { pos: 0, pending: 1 }
    }
}

impl FrameScan {
    fn resume(&mut self, buf: &[u8]) -> Result<Option<usize>> {
        while self.pending > 0 {
            let Some(&marker) = buf.get(self.pos) else {
                return Ok(None);
            };
            let mut pos = self.pos + 1;
            let mut pending = self.pending - 1;

            let skip = match marker {
                // positive fixint, negative fixint, nil, false, true
                0x00..=0x7f | 0xe0..=0xff | 0xc0 | 0xc2 | 0xc3 => 0,
                // fixmap
                0x80..=0x8f => {
                    pending += 2 * u64::from(marker & 0x0f);
                    0
                }
                // fixarray
                0x90..=0x9f => {
                    pending += u64::from(marker & 0x0f);
                    0
                }
                // fixstr
                0xa0..=0xbf => usize::from(marker & 0x1f),
                0xc1 => {
                    return Err(Error::CorruptStream(format!(
                        "reserved MessagePack marker 0xc1 at offset {}",
                        self.pos
                    )))
                }
                // bin8/str8, bin16/str16, bin32/str32
                0xc4 | 0xd9 => try_len!(read_len(buf, &mut pos, 1)),
                0xc5 | 0xda => try_len!(read_len(buf, &mut pos, 2)),
                0xc6 | 0xdb => try_len!(read_len(buf, &mut pos, 4)),
                // ext8/16/32: length, then a type byte, then data
                0xc7 => try_len!(read_len(buf, &mut pos, 1)) + 1,
                0xc8 => try_len!(read_len(buf, &mut pos, 2)) + 1,
                0xc9 => try_len!(read_len(buf, &mut pos, 4)) + 1,
                // uint8 / int8
                0xcc | 0xd0 => 1,
                // uint16 / int16
                0xcd | 0xd1 => 2,
                // float32 / uint32 / int32
                0xca | 0xce | 0xd2 => 4,
                // float64 / uint64 / int64
                0xcb | 0xcf | 0xd3 => 8,
                // fixext 1/2/4/8/16, each with a type byte
                0xd4 => 2,
                0xd5 => 3,
                0xd6 => 5,
                0xd7 => 9,
                0xd8 => 17,
                // array16 / array32
                0xdc => {
                    pending += try_len!(read_len(buf, &mut pos, 2)) as u64;
                    0
                }
                0xdd => {
                    pending += try_len!(read_len(buf, &mut pos, 4)) as u64;
                    0
                }
                // map16 / map32
                0xde => {
                    pending += 2 * try_len!(read_len(buf, &mut pos, 2)) as u64;
                    0
                }
                0xdf => {
                    pending += 2 * try_len!(read_len(buf, &mut pos, 4)) as u64;
                    0
                }
            };

            match pos.checked_add(skip) {
                Some(end) if end <= buf.len() => {
                    self.pos = end;
                    self.pending = pending;
                }
                _ => return Ok(None),
            }
        }
        Ok(Some(self.pos))
    }
}

/// Read a big-endian length prefix of `width` bytes at `*pos`.
fn read_len(buf: &[u8], pos: &mut usize, width: usize) -> Option<usize> {
    let bytes = buf.get(*pos..*pos + width)?;
    *pos += width;
    let len = bytes
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    usize::try_from(len).ok()
}

/// Decodes records from a sequence of decompressed fragments.
///
/// The backlog only ever holds the unfinished tail of the stream: bytes are
/// appended by [`push`](Self::push) and removed from the front one whole
/// record at a time by [`next_record`](Self::next_record).
#[derive(Debug, Default)]
pub struct RecordDecoder {
    backlog: BytesMut,
    scan: FrameScan,
    records: u64,
    consumed: u64,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one decompressed fragment.
    pub fn push(&mut self, fragment: &[u8]) {
        self.backlog.extend_from_slice(fragment);
    }

    /// Decode the next complete record at the front of the backlog.
    ///
    /// Returns `Ok(None)` when the backlog holds no complete record; the
    /// partial bytes are kept for the next [`push`](Self::push).
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let Some(len) = self.scan.resume(&self.backlog)? else {
            return Ok(None);
        };
        let mut frame = &self.backlog[..len];
        let record = rmpv::decode::read_value(&mut frame).map_err(|e| {
            Error::CorruptStream(format!("invalid record #{}: {}", self.records + 1, e))
        })?;
        self.backlog.advance(len);
        self.scan = FrameScan::default();
        self.records += 1;
        self.consumed += len as u64;
        Ok(Some(record))
    }

    /// Decode every complete record currently in the backlog.
    pub fn drain(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    /// Bytes waiting for the rest of their record.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Records decoded so far.
    pub fn records_decoded(&self) -> u64 {
        self.records
    }

    /// Decompressed bytes consumed by decoded records.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Signal end of stream. Fails if a partial record is left over.
    pub fn finish(&mut self) -> Result<()> {
        if self.backlog.is_empty() {
            return Ok(());
        }
        let pending = self.backlog.len();
        self.backlog = BytesMut::new();
        self.scan = FrameScan::default();
        Err(Error::TruncatedRecord { pending })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmpv::Value;

    fn encode(values: &[Value]) -> Vec<u8> {
        let mut buf = Vec::new();
        for v in values {
            rmpv::encode::write_value(&mut buf, v).unwrap();
        }
        buf
    }

    fn sample_values() -> Vec<Value> {
        vec![
            Value::Nil,
            Value::from(true),
            Value::from(7),
            Value::from(-3),
            Value::from(300),
            Value::from(-70_000),
            Value::from(u64::MAX),
            Value::from(1.5f32),
            Value::from(2.25f64),
            Value::from("short"),
            Value::from("x".repeat(40)),
            Value::from("y".repeat(300)),
            Value::from("z".repeat(70_000)),
            Value::Binary(vec![1, 2, 3]),
            Value::Binary(vec![0; 70_000]),
            Value::Array((0..20).map(Value::from).collect()),
            Value::Map(vec![
                (Value::from("id"), Value::from(1)),
                (Value::from("tags"), Value::Array(vec![Value::from("a")])),
            ]),
            Value::Map(
                (0..20)
                    .map(|i| (Value::from(i), Value::from(format!("v{}", i))))
                    .collect(),
            ),
            Value::Ext(1, vec![9]),
            Value::Ext(2, vec![1, 2]),
            Value::Ext(3, vec![0; 4]),
            Value::Ext(4, vec![0; 8]),
            Value::Ext(5, vec![0; 16]),
            Value::Ext(6, vec![0; 3]),
            Value::Ext(7, vec![0; 300]),
            Value::Array(vec![
                Value::from("2024-01-01"),
                Value::Nil,
                Value::Array(vec![Value::Array(vec![Value::from(1)])]),
            ]),
        ]
    }

    #[test]
    fn test_frame_len_matches_encoded_length() {
        for value in sample_values() {
            let bytes = encode(std::slice::from_ref(&value));
            assert_eq!(
                frame_len(&bytes).unwrap(),
                Some(bytes.len()),
                "value {:?}",
                value
            );
            for cut in 0..bytes.len().min(64) {
                assert_eq!(frame_len(&bytes[..cut]).unwrap(), None, "cut {}", cut);
            }
        }
    }

    #[test]
    fn test_scan_resumes_at_element_boundary() {
        let row = Value::Array((0..1000).map(Value::from).collect());
        let bytes = encode(&[row]);

        let mut scan = FrameScan::default();
        assert_eq!(scan.resume(&bytes[..500]).unwrap(), None);
        let resumed_at = scan.pos;
        assert!(resumed_at > 400 && resumed_at <= 500);

        assert_eq!(scan.resume(&bytes).unwrap(), Some(bytes.len()));
    }

    #[test]
    fn test_frame_len_rejects_reserved_marker() {
        let err = frame_len(&[0xc1]).unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn test_decoder_whole_payload() {
        let values = sample_values();
        let mut decoder = RecordDecoder::new();
        decoder.push(&encode(&values));
        assert_eq!(decoder.drain().unwrap(), values);
        assert_eq!(decoder.backlog_len(), 0);
        decoder.finish().unwrap();
        assert_eq!(decoder.records_decoded(), values.len() as u64);
    }

    #[test]
    fn test_decoder_byte_at_a_time() {
        let values = sample_values();
        let payload = encode(&values);
        let mut decoder = RecordDecoder::new();
        let mut decoded = Vec::new();
        for b in &payload {
            decoder.push(std::slice::from_ref(b));
            decoded.extend(decoder.drain().unwrap());
        }
        decoder.finish().unwrap();
        assert_eq!(decoded, values);
        assert_eq!(decoder.bytes_consumed(), payload.len() as u64);
    }

    #[test]
    fn test_backlog_is_only_the_partial_record() {
        let row = Value::Array(vec![Value::from(1), Value::from("abc")]);
        let bytes = encode(&[row.clone(), row.clone()]);
        let one = bytes.len() / 2;

        let mut decoder = RecordDecoder::new();
        decoder.push(&bytes[..one + 2]);
        assert_eq!(decoder.drain().unwrap(), vec![row.clone()]);
        assert_eq!(decoder.backlog_len(), 2);

        decoder.push(&bytes[one + 2..]);
        assert_eq!(decoder.drain().unwrap(), vec![row]);
        assert_eq!(decoder.backlog_len(), 0);
    }

    #[test]
    fn test_truncated_record() {
        // str32 header declaring 100 bytes followed by only 40
        let mut bytes = vec![0xdb, 0, 0, 0, 100];
        bytes.extend_from_slice(&[b'a'; 40]);

        let mut decoder = RecordDecoder::new();
        decoder.push(&bytes);
        assert!(decoder.next_record().unwrap().is_none());
        let err = decoder.finish().unwrap_err();
        assert!(matches!(err, Error::TruncatedRecord { pending: 45 }));
    }

    #[test]
    fn test_empty_stream_is_ok() {
        let mut decoder = RecordDecoder::new();
        assert!(decoder.next_record().unwrap().is_none());
        decoder.finish().unwrap();
    }

    #[test]
    fn test_corrupt_record_after_valid_ones() {
        let mut bytes = encode(&[Value::from(1), Value::from(2)]);
        bytes.push(0xc1);

        let mut decoder = RecordDecoder::new();
        decoder.push(&bytes);
        assert_eq!(decoder.next_record().unwrap(), Some(Value::from(1)));
        assert_eq!(decoder.next_record().unwrap(), Some(Value::from(2)));
        assert!(matches!(
            decoder.next_record(),
            Err(Error::CorruptStream(_))
        ));
    }
}
