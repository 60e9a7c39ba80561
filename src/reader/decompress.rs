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

//! Streaming decompression of result fragments.
//!
//! A [`Decompressor`] is fed one compressed fragment at a time and returns
//! whatever plain bytes that fragment completes. Fragment boundaries may fall
//! anywhere, including inside the gzip header or trailer. The decompressor
//! state lives exactly as long as the owning stream.
//!
//! gzip goes through `flate2::write::GzDecoder`, which parses the header
//! incrementally and checks the CRC32 and length trailer. zlib-wrapped
//! deflate goes through `flate2::Decompress` directly so that the end of the
//! stream is observable.

use crate::error::{Error, Result};
use crate::types::CompressionCodec;
use bytes::Bytes;
use flate2::write::GzDecoder;
use flate2::{Decompress, FlushDecompress, Status};
use std::io::Write;

/// Spare output capacity guaranteed before each inflate call.
const OUTPUT_CHUNK: usize = 32 * 1024;

fn corrupt(codec: CompressionCodec, detail: impl std::fmt::Display) -> Error {
    Error::CorruptStream(format!("{} stream: {}", codec, detail))
}

fn trailing_bytes(codec: CompressionCodec, len: usize) -> Error {
    corrupt(codec, format!("{} trailing bytes after end of stream", len))
}

/// Incremental decompressor for one result stream.
#[derive(Debug)]
pub struct Decompressor {
    codec: CompressionCodec,
    state: State,
    total_in: u64,
    total_out: u64,
}

#[derive(Debug)]
enum State {
    Identity,
    Gzip(Box<GzipStream>),
    Deflate(Box<ZlibStream>),
}

impl Decompressor {
    pub fn new(codec: CompressionCodec) -> Self {
        let state = match codec {
            CompressionCodec::None => State::Identity,
            CompressionCodec::Gzip => State::Gzip(Box::new(GzipStream::new())),
            CompressionCodec::Deflate => State::Deflate(Box::new(ZlibStream::new())),
        };
        Self {
            codec,
            state,
            total_in: 0,
            total_out: 0,
        }
    }

    pub fn codec(&self) -> CompressionCodec {
        self.codec
    }

    /// Compressed bytes fed so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Plain bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Decompress one fragment. May return an empty buffer when the fragment
    /// only advanced internal state (header bytes, a partial codeword).
    pub fn decompress(&mut self, fragment: Bytes) -> Result<Bytes> {
        self.total_in += fragment.len() as u64;
        let out = match self.state {
            State::Identity => fragment,
            State::Gzip(ref mut gz) => gz.feed(&fragment)?,
            State::Deflate(ref mut zlib) => {
                let mut out = Vec::new();
                zlib.feed(&fragment, &mut out)?;
                Bytes::from(out)
            }
        };
        self.total_out += out.len() as u64;
        Ok(out)
    }

    /// Check that the compressed stream ended cleanly and return any output
    /// still held by the decoder.
    ///
    /// A declared encoding with an entirely empty body is accepted as an
    /// empty result.
    pub fn finish(&mut self) -> Result<Bytes> {
        if self.total_in == 0 {
            return Ok(Bytes::new());
        }
        let tail = match self.state {
            State::Identity => Bytes::new(),
            State::Gzip(ref mut gz) => gz.finish()?,
            State::Deflate(ref zlib) => {
                zlib.finish()?;
                Bytes::new()
            }
        };
        self.total_out += tail.len() as u64;
        Ok(tail)
    }
}

/// gzip member decoder writing into an in-memory buffer that is drained
/// after every fragment.
struct GzipStream {
    decoder: GzDecoder<Vec<u8>>,
}

impl std::fmt::Debug for GzipStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipStream")
            .field("header_parsed", &self.decoder.header().is_some())
            .finish()
    }
}

impl GzipStream {
    fn new() -> Self {
        Self {
            decoder: GzDecoder::new(Vec::new()),
        }
    }

    fn feed(&mut self, mut input: &[u8]) -> Result<Bytes> {
        let codec = CompressionCodec::Gzip;
        while !input.is_empty() {
            let n = self.decoder.write(input).map_err(|e| corrupt(codec, e))?;
            // the member and its trailer are complete; nothing more is accepted
            if n == 0 {
                return Err(trailing_bytes(codec, input.len()));
            }
            input = &input[n..];
        }
        self.decoder.flush().map_err(|e| corrupt(codec, e))?;
        Ok(self.take_output())
    }

    fn finish(&mut self) -> Result<Bytes> {
        self.decoder
            .try_finish()
            .map_err(|e| corrupt(CompressionCodec::Gzip, e))?;
        Ok(self.take_output())
    }

    fn take_output(&mut self) -> Bytes {
        Bytes::from(std::mem::take(self.decoder.get_mut()))
    }
}

/// Inflate as much of `input` as possible into `out`.
///
/// Returns the number of input bytes consumed and whether the deflate stream
/// reached its end. Unless the stream ended, all of `input` is consumed and
/// all pending output is drained.
fn inflate_into(
    codec: CompressionCodec,
    inflate: &mut Decompress,
    input: &[u8],
    out: &mut Vec<u8>,
) -> Result<(usize, bool)> {
    let mut consumed = 0;
    loop {
        if out.capacity() - out.len() < OUTPUT_CHUNK {
            out.reserve(OUTPUT_CHUNK);
        }
        let before_in = inflate.total_in();
        let before_out = inflate.total_out();
        let status = inflate
            .decompress_vec(&input[consumed..], out, FlushDecompress::None)
            .map_err(|e| corrupt(codec, e))?;
        let read = (inflate.total_in() - before_in) as usize;
        let written = (inflate.total_out() - before_out) as usize;
        consumed += read;

        match status {
            Status::StreamEnd => return Ok((consumed, true)),
            Status::Ok | Status::BufError => {
                let output_drained = out.len() < out.capacity();
                if consumed == input.len() && output_drained {
                    return Ok((consumed, false));
                }
                if read == 0 && written == 0 && output_drained {
                    return Err(corrupt(codec, "decompressor made no progress"));
                }
            }
        }
    }
}

#[derive(Debug)]
struct ZlibStream {
    inflate: Decompress,
    ended: bool,
}

impl ZlibStream {
    fn new() -> Self {
        Self {
            // zlib header and adler32 trailer are checked by the inflater
            inflate: Decompress::new(true),
            ended: false,
        }
    }

    fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let codec = CompressionCodec::Deflate;
        if input.is_empty() {
            return Ok(());
        }
        if self.ended {
            return Err(trailing_bytes(codec, input.len()));
        }
        let (consumed, ended) = inflate_into(codec, &mut self.inflate, input, out)?;
        self.ended = ended;
        if ended && consumed < input.len() {
            return Err(trailing_bytes(codec, input.len() - consumed));
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        if self.ended {
            Ok(())
        } else {
            Err(corrupt(
                CompressionCodec::Deflate,
                "unexpected end of compressed data",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::{Compression, GzBuilder};
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn sample_payload() -> Vec<u8> {
        (0..20_000u32)
            .flat_map(|i| format!("row-{}\n", i % 97).into_bytes())
            .collect()
    }

    fn run(codec: CompressionCodec, compressed: &[u8], fragment_size: usize) -> Result<Vec<u8>> {
        let mut decompressor = Decompressor::new(codec);
        let mut out = Vec::new();
        for chunk in compressed.chunks(fragment_size) {
            out.extend_from_slice(&decompressor.decompress(Bytes::copy_from_slice(chunk))?);
        }
        out.extend_from_slice(&decompressor.finish()?);
        Ok(out)
    }

    #[test]
    fn test_identity_passes_through() {
        let mut decompressor = Decompressor::new(CompressionCodec::None);
        let out = decompressor.decompress(Bytes::from_static(b"abc")).unwrap();
        assert_eq!(out, "abc");
        decompressor.finish().unwrap();
        assert_eq!(decompressor.total_in(), 3);
        assert_eq!(decompressor.total_out(), 3);
    }

    #[test]
    fn test_gzip_any_fragment_size() {
        let payload = sample_payload();
        let compressed = gzip(&payload);
        for size in [1, 2, 7, 10, 11, 512, compressed.len()] {
            let out = run(CompressionCodec::Gzip, &compressed, size).unwrap();
            assert_eq!(out, payload, "fragment size {}", size);
        }
    }

    #[test]
    fn test_gzip_optional_header_fields() {
        let payload = b"named member".to_vec();
        let mut encoder = GzBuilder::new()
            .filename("result.msgpack")
            .comment("job output")
            .extra(vec![1, 2, 3, 4])
            .write(Vec::new(), Compression::fast());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        for size in [1, 3, compressed.len()] {
            assert_eq!(run(CompressionCodec::Gzip, &compressed, size).unwrap(), payload);
        }
    }

    #[test]
    fn test_deflate_any_fragment_size() {
        let payload = sample_payload();
        let compressed = zlib(&payload);
        for size in [1, 5, 4096, compressed.len()] {
            let out = run(CompressionCodec::Deflate, &compressed, size).unwrap();
            assert_eq!(out, payload, "fragment size {}", size);
        }
    }

    #[test]
    fn test_gzip_output_is_incremental() {
        let payload = sample_payload();
        let compressed = gzip(&payload);
        let mut decompressor = Decompressor::new(CompressionCodec::Gzip);
        let half = compressed.len() / 2;
        let first = decompressor
            .decompress(Bytes::copy_from_slice(&compressed[..half]))
            .unwrap();
        assert!(!first.is_empty());
        assert!(first.len() < payload.len());
        assert_eq!(&payload[..first.len()], &first[..]);
    }

    #[test]
    fn test_gzip_invalid_magic() {
        let mut decompressor = Decompressor::new(CompressionCodec::Gzip);
        let err = decompressor
            .decompress(Bytes::from_static(b"definitely not gzip"))
            .unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn test_gzip_truncated_is_corrupt() {
        let compressed = gzip(&sample_payload());
        let cut = &compressed[..compressed.len() - 3];
        let err = run(CompressionCodec::Gzip, cut, 64).unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));

        let err = run(CompressionCodec::Gzip, &compressed[..5], 64).unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn test_gzip_crc_mismatch() {
        let mut compressed = gzip(b"some rows");
        let crc_at = compressed.len() - 8;
        compressed[crc_at] ^= 0xff;
        let err = run(CompressionCodec::Gzip, &compressed, 4).unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn test_gzip_trailing_garbage() {
        let mut compressed = gzip(b"some rows");
        compressed.extend_from_slice(b"junk");
        let err = run(CompressionCodec::Gzip, &compressed, 1024).unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn test_deflate_invalid_header() {
        let mut decompressor = Decompressor::new(CompressionCodec::Deflate);
        let err = decompressor
            .decompress(Bytes::from_static(b"not a zlib stream"))
            .unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn test_deflate_truncated_is_corrupt() {
        let compressed = zlib(&sample_payload());
        let err = run(CompressionCodec::Deflate, &compressed[..compressed.len() / 2], 100)
            .unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn test_empty_body_with_declared_encoding() {
        for codec in [CompressionCodec::Gzip, CompressionCodec::Deflate] {
            let mut decompressor = Decompressor::new(codec);
            decompressor.finish().unwrap();
        }
    }

    #[test]
    fn test_gzip_header_only_is_truncated() {
        let compressed = gzip(b"x");
        let mut decompressor = Decompressor::new(CompressionCodec::Gzip);
        let out = decompressor
            .decompress(Bytes::copy_from_slice(&compressed[..10]))
            .unwrap();
        assert!(out.is_empty());
        assert!(matches!(
            decompressor.finish().unwrap_err(),
            Error::CorruptStream(_)
        ));
    }

    #[test]
    fn test_gzip_second_member_is_trailing_data() {
        let mut compressed = gzip(b"first");
        compressed.extend_from_slice(&gzip(b"second"));
        for size in [3, compressed.len()] {
            let err = run(CompressionCodec::Gzip, &compressed, size).unwrap_err();
            assert!(err.to_string().contains("trailing bytes"), "{}", err);
        }
    }
}
