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

//! Result retrieval types: output formats, content encodings and the
//! policies that map a response's `Content-Encoding` onto a decompressor.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// One decoded result row (or any other MessagePack value in the stream).
pub type Record = rmpv::Value;

/// Compression codec applied to the result body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionCodec {
    /// Bytes are passed through unchanged.
    #[default]
    None,
    /// gzip container (RFC 1952).
    Gzip,
    /// zlib-wrapped deflate stream, as HTTP `deflate` denotes.
    Deflate,
}

impl CompressionCodec {
    pub fn is_compressed(&self) -> bool {
        !matches!(self, CompressionCodec::None)
    }
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompressionCodec::None => "none",
            CompressionCodec::Gzip => "gzip",
            CompressionCodec::Deflate => "deflate",
        })
    }
}

fn is_gzip(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("gzip") || value.eq_ignore_ascii_case("x-gzip")
}

/// How a stream picks its decompressor from the `Content-Encoding` header.
///
/// Both conventions exist in deployed clients and produce different results
/// for responses without the header, so neither is the universal default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingPolicy {
    /// Decompress only bodies declared as `gzip`; pass everything else through.
    Explicit,
    /// Always decompress. `deflate` selects zlib; any other value, including
    /// a missing header, selects gzip.
    AssumeGzip,
}

impl EncodingPolicy {
    /// Select the codec for a session from its content-encoding header.
    pub fn select(self, content_encoding: Option<&str>) -> CompressionCodec {
        match self {
            EncodingPolicy::Explicit => match content_encoding {
                Some(ce) if is_gzip(ce) => CompressionCodec::Gzip,
                _ => CompressionCodec::None,
            },
            EncodingPolicy::AssumeGzip => match content_encoding {
                Some(ce) if ce.trim().eq_ignore_ascii_case("deflate") => {
                    CompressionCodec::Deflate
                }
                _ => CompressionCodec::Gzip,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingPolicy::Explicit => "explicit",
            EncodingPolicy::AssumeGzip => "assume-gzip",
        }
    }
}

impl FromStr for EncodingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" | "direct" => Ok(EncodingPolicy::Explicit),
            "assume-gzip" | "assume_gzip" | "legacy" => Ok(EncodingPolicy::AssumeGzip),
            other => Err(Error::InvalidConfig(format!(
                "unknown decompression policy '{}' (expected 'explicit' or 'assume-gzip')",
                other
            ))),
        }
    }
}

/// Output format requested from the result endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultFormat {
    MessagePack,
    MessagePackGz,
    Json,
    Csv,
    Tsv,
    /// Any other format name the server understands.
    Other(String),
}

impl ResultFormat {
    pub fn as_str(&self) -> &str {
        match self {
            ResultFormat::MessagePack => "msgpack",
            ResultFormat::MessagePackGz => "msgpack.gz",
            ResultFormat::Json => "json",
            ResultFormat::Csv => "csv",
            ResultFormat::Tsv => "tsv",
            ResultFormat::Other(name) => name,
        }
    }

    /// True when the body can be decoded into [`Record`]s as it streams.
    pub fn is_record_stream(&self) -> bool {
        matches!(self, ResultFormat::MessagePack)
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ResultFormat {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "msgpack" => ResultFormat::MessagePack,
            "msgpack.gz" => ResultFormat::MessagePackGz,
            "json" => ResultFormat::Json,
            "csv" => ResultFormat::Csv,
            "tsv" => ResultFormat::Tsv,
            _ => ResultFormat::Other(s.trim().to_string()),
        }
    }
}

/// Outcome of a collect-all fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    /// Decoded rows of a `msgpack` result.
    Records(Vec<Record>),
    /// Decompressed body of any other format.
    Raw(Bytes),
}

impl JobResult {
    pub fn records(&self) -> Option<&[Record]> {
        match self {
            JobResult::Records(records) => Some(records),
            JobResult::Raw(_) => None,
        }
    }

    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            JobResult::Records(records) => Some(records),
            JobResult::Raw(_) => None,
        }
    }

    pub fn raw(&self) -> Option<&Bytes> {
        match self {
            JobResult::Raw(bytes) => Some(bytes),
            JobResult::Records(_) => None,
        }
    }
}

/// A record together with the compressed bytes consumed when it became
/// available.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    pub record: Record,
    pub compressed_bytes: u64,
}
