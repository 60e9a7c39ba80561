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

//! Result streams: one job's result retrieval session.
//!
//! ```text
//! [FragmentSource] -> [ProgressTracker] -> [Decompressor] -> [RecordDecoder]
//!  \_______________________ RawStream ____________________/
//!  \___________________________________ ResultStream ___________________/
//! ```
//!
//! Both streams are strictly forward-only. Once end of stream or an error
//! has been observed, the decompressor and decoder are dropped and every
//! later pull returns `None`.

use crate::error::{Error, Result};
use crate::reader::decoder::RecordDecoder;
use crate::reader::decompress::Decompressor;
use crate::reader::progress::ProgressTracker;
use crate::reader::source::FragmentSource;
use crate::types::{CompressionCodec, EncodingPolicy, ProgressRecord, Record};
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

/// Check the response status before anything is streamed.
fn check_status<S: FragmentSource>(source: &S) -> Result<()> {
    let status = source.status();
    if (200..300).contains(&status) {
        return Ok(());
    }
    let message = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unexpected status")
        .to_string();
    Err(Error::RequestFailed { status, message })
}

/// Stream of decompressed result bytes, without record decoding.
#[derive(Debug)]
pub struct RawStream<S> {
    source: ProgressTracker<S>,
    codec: CompressionCodec,
    /// `None` once the stream has ended or failed.
    decompressor: Option<Decompressor>,
}

impl<S: FragmentSource> RawStream<S> {
    /// Open a session over `source`.
    ///
    /// Fails with [`Error::RequestFailed`] without pulling any fragment when
    /// the response status is not a success. The content-encoding is read
    /// here, once, and fixed for the session.
    pub fn open(source: S, policy: EncodingPolicy) -> Result<Self> {
        check_status(&source)?;
        let codec = policy.select(source.content_encoding());
        debug!(
            "Opening result stream: content_encoding={:?}, policy={}, codec={}",
            source.content_encoding(),
            policy.as_str(),
            codec
        );
        Ok(Self {
            source: ProgressTracker::new(source),
            codec,
            decompressor: Some(Decompressor::new(codec)),
        })
    }

    pub fn codec(&self) -> CompressionCodec {
        self.codec
    }

    /// Compressed bytes received so far.
    pub fn compressed_bytes(&self) -> u64 {
        self.source.compressed_bytes()
    }

    /// Fragments received so far.
    pub fn fragments(&self) -> u64 {
        self.source.fragments()
    }

    /// True once end of stream or an error has been observed.
    pub fn is_finished(&self) -> bool {
        self.decompressor.is_none()
    }

    /// Next non-empty block of decompressed bytes, or `None` at end of
    /// stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let result = self.pull_chunk().await;
        if result.is_err() {
            // release decompressor buffers on failure
            self.decompressor = None;
        }
        result
    }

    async fn pull_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            if self.decompressor.is_none() {
                return Ok(None);
            }
            match self.source.next_fragment().await? {
                Some(fragment) => {
                    trace!(
                        "Fragment #{}: {} bytes ({} total)",
                        self.source.fragments(),
                        fragment.len(),
                        self.source.compressed_bytes()
                    );
                    let Some(decompressor) = self.decompressor.as_mut() else {
                        return Ok(None);
                    };
                    let chunk = decompressor.decompress(fragment)?;
                    if !chunk.is_empty() {
                        return Ok(Some(chunk));
                    }
                }
                None => {
                    let Some(mut decompressor) = self.decompressor.take() else {
                        return Ok(None);
                    };
                    let tail = decompressor.finish()?;
                    debug!(
                        "Result body complete: {} fragments, {} compressed bytes, {} decompressed bytes",
                        self.source.fragments(),
                        decompressor.total_in(),
                        decompressor.total_out()
                    );
                    return Ok((!tail.is_empty()).then_some(tail));
                }
            }
        }
    }

    /// Drain the stream into `sink`, returning the compressed byte total.
    ///
    /// `progress`, if given, is called with the running compressed total
    /// after each write, and once more at the end if the total moved since
    /// the last call.
    pub async fn copy_into<W>(
        mut self,
        sink: &mut W,
        mut progress: Option<&mut (dyn FnMut(u64) + Send)>,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut reported = 0u64;
        let mut written = 0u64;
        while let Some(chunk) = self.next_chunk().await? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
            if let Some(report) = progress.as_deref_mut() {
                reported = self.compressed_bytes();
                report(reported);
            }
        }
        sink.flush().await?;
        let total = self.compressed_bytes();
        if let Some(report) = progress.as_deref_mut() {
            if total != reported {
                report(total);
            }
        }
        info!(
            "Raw result copied: {} compressed bytes, {} bytes written",
            total, written
        );
        Ok(total)
    }

    /// Drain the stream into memory.
    pub async fn collect_bytes(mut self) -> Result<Bytes> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buf))
    }
}

/// Stream of decoded MessagePack records.
#[derive(Debug)]
pub struct ResultStream<S> {
    raw: RawStream<S>,
    /// `None` once the stream has ended or failed.
    decoder: Option<RecordDecoder>,
}

impl<S: FragmentSource> ResultStream<S> {
    /// Open a record session over `source`. See [`RawStream::open`].
    pub fn open(source: S, policy: EncodingPolicy) -> Result<Self> {
        Ok(Self {
            raw: RawStream::open(source, policy)?,
            decoder: Some(RecordDecoder::new()),
        })
    }

    pub fn codec(&self) -> CompressionCodec {
        self.raw.codec()
    }

    /// Compressed bytes received so far.
    pub fn compressed_bytes(&self) -> u64 {
        self.raw.compressed_bytes()
    }

    /// True once end of stream or an error has been observed.
    pub fn is_finished(&self) -> bool {
        self.decoder.is_none()
    }

    /// Next decoded record, or `None` at end of stream.
    pub async fn next_record(&mut self) -> Result<Option<Record>> {
        let result = self.pull_record().await;
        match result {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Some(decoder) = self.decoder.take() {
                    info!(
                        "Result stream complete: {} records, {} compressed bytes",
                        decoder.records_decoded(),
                        self.raw.compressed_bytes()
                    );
                }
            }
            Err(ref e) => {
                warn!(
                    "Result stream failed after {} compressed bytes: {}",
                    self.raw.compressed_bytes(),
                    e
                );
                self.decoder = None;
                self.raw.decompressor = None;
            }
        }
        result
    }

    /// Next record together with the compressed byte count at the moment
    /// it became available.
    pub async fn next_record_with_progress(&mut self) -> Result<Option<ProgressRecord>> {
        Ok(self.next_record().await?.map(|record| ProgressRecord {
            record,
            compressed_bytes: self.raw.compressed_bytes(),
        }))
    }

    async fn pull_record(&mut self) -> Result<Option<Record>> {
        loop {
            let Some(decoder) = self.decoder.as_mut() else {
                return Ok(None);
            };
            if let Some(record) = decoder.next_record()? {
                return Ok(Some(record));
            }
            match self.raw.next_chunk().await? {
                Some(chunk) => {
                    if let Some(decoder) = self.decoder.as_mut() {
                        decoder.push(&chunk);
                    }
                }
                None => {
                    if let Some(decoder) = self.decoder.as_mut() {
                        decoder.finish()?;
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Decode every remaining record into memory.
    pub async fn collect(mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// Call `handler` once per record, in arrival order. A handler error
    /// aborts the stream and is returned.
    pub async fn for_each<F>(mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(Record) -> Result<()>,
    {
        while let Some(record) = self.next_record().await? {
            handler(record)?;
        }
        Ok(())
    }

    /// Like [`for_each`](Self::for_each), also passing the compressed byte
    /// count at the time each record became available.
    pub async fn for_each_with_progress<F>(mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(Record, u64) -> Result<()>,
    {
        while let Some(item) = self.next_record_with_progress().await? {
            handler(item.record, item.compressed_bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::source::MemoryFragmentSource;
    use rmpv::Value;
    use std::sync::atomic::Ordering;

    fn encode(values: &[Value]) -> Vec<u8> {
        let mut buf = Vec::new();
        for v in values {
            rmpv::encode::write_value(&mut buf, v).unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn test_request_failed_pulls_nothing() {
        let source = MemoryFragmentSource::new(None, vec![encode(&[Value::from(1)])])
            .with_status(500);
        let pulls = source.pull_counter();
        let err = ResultStream::open(source, EncodingPolicy::Explicit).unwrap_err();
        assert!(matches!(err, Error::RequestFailed { status: 500, .. }));
        assert_eq!(pulls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_plain_records() {
        let values = vec![Value::from(1), Value::from("two")];
        let source = MemoryFragmentSource::chunked(None, &encode(&values), 3);
        let stream = ResultStream::open(source, EncodingPolicy::Explicit).unwrap();
        assert_eq!(stream.codec(), CompressionCodec::None);
        assert_eq!(stream.collect().await.unwrap(), values);
    }

    #[tokio::test]
    async fn test_finished_stream_stays_finished() {
        let source = MemoryFragmentSource::new(None, vec![encode(&[Value::from(1)])]);
        let mut stream = ResultStream::open(source, EncodingPolicy::Explicit).unwrap();
        assert_eq!(stream.next_record().await.unwrap(), Some(Value::from(1)));
        assert!(stream.next_record().await.unwrap().is_none());
        assert!(stream.is_finished());
        assert!(stream.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_releases_state() {
        let mut bytes = encode(&[Value::from(1)]);
        bytes.extend_from_slice(&[0xdb, 0, 0, 0, 100]);
        let source = MemoryFragmentSource::new(None, vec![bytes]);
        let mut stream = ResultStream::open(source, EncodingPolicy::Explicit).unwrap();
        assert_eq!(stream.next_record().await.unwrap(), Some(Value::from(1)));
        let err = stream.next_record().await.unwrap_err();
        assert!(matches!(err, Error::TruncatedRecord { pending: 5 }));
        assert!(stream.is_finished());
        assert!(stream.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let source = MemoryFragmentSource::new(None, vec![encode(&[Value::from(1)])])
            .with_trailing_error("connection reset");
        let stream = ResultStream::open(source, EncodingPolicy::Explicit).unwrap();
        let mut seen = Vec::new();
        let err = stream
            .for_each(|r| {
                seen.push(r);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(seen, vec![Value::from(1)]);
    }

    #[tokio::test]
    async fn test_raw_collect_bytes() {
        let source = MemoryFragmentSource::chunked(None, b"a,b\n1,2\n", 2);
        let raw = RawStream::open(source, EncodingPolicy::Explicit).unwrap();
        assert_eq!(raw.collect_bytes().await.unwrap(), "a,b\n1,2\n");
    }
}
