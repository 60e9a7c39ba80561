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

//! Result readers for streaming job results.
//!
//! This module provides:
//! - `FragmentSource`: the raw, still-compressed response body
//! - `ResultStream` / `RawStream`: the async decode pipeline
//! - `spawn_record_channel`: a bounded producer/consumer surface
//! - `ResultReader`: a synchronous pull interface over either of the above

pub mod channel;
pub mod decoder;
pub mod decompress;
pub mod progress;
pub mod source;
pub mod stream;

use crate::error::Result;
use crate::types::{ProgressRecord, Record};

pub use channel::{collect_channel, spawn_record_channel, RecordReceiver};
pub use decoder::RecordDecoder;
pub use decompress::Decompressor;
pub use progress::ProgressTracker;
pub use source::{FragmentSource, HttpFragmentSource, MemoryFragmentSource};
pub use stream::{RawStream, ResultStream};

/// Synchronous, forward-only record reader.
pub trait ResultReader: Send {
    /// Get the next record, or None at end of results.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Compressed bytes received so far.
    fn compressed_bytes(&self) -> u64;
}

/// Drives a [`ResultStream`] on a runtime handle for callers outside async
/// code.
///
/// Must not be used from within the runtime's own worker threads.
#[derive(Debug)]
pub struct BlockingResultReader<S> {
    stream: ResultStream<S>,
    runtime_handle: tokio::runtime::Handle,
}

impl<S: FragmentSource> BlockingResultReader<S> {
    pub fn new(stream: ResultStream<S>, runtime_handle: tokio::runtime::Handle) -> Self {
        Self {
            stream,
            runtime_handle,
        }
    }

    /// Next record together with the compressed byte count when it became
    /// available.
    pub fn next_record_with_progress(&mut self) -> Result<Option<ProgressRecord>> {
        self.runtime_handle
            .block_on(self.stream.next_record_with_progress())
    }

    pub fn into_inner(self) -> ResultStream<S> {
        self.stream
    }
}

impl<S: FragmentSource> ResultReader for BlockingResultReader<S> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        self.runtime_handle.block_on(self.stream.next_record())
    }

    fn compressed_bytes(&self) -> u64 {
        self.stream.compressed_bytes()
    }
}

impl<S: FragmentSource> Iterator for BlockingResultReader<S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        ResultReader::next_record(self).transpose()
    }
}

/// Reader over a record channel, blocking on the receiver.
#[derive(Debug)]
pub struct ChannelResultReader {
    receiver: RecordReceiver,
    compressed_bytes: u64,
}

impl ChannelResultReader {
    pub fn new(receiver: RecordReceiver) -> Self {
        Self {
            receiver,
            compressed_bytes: 0,
        }
    }
}

impl ResultReader for ChannelResultReader {
    fn next_record(&mut self) -> Result<Option<Record>> {
        match self.receiver.blocking_recv() {
            Some(Ok(item)) => {
                self.compressed_bytes = item.compressed_bytes;
                Ok(Some(item.record))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn compressed_bytes(&self) -> u64 {
        self.compressed_bytes
    }
}

/// Adapter turning any boxed [`ResultReader`] into an iterator.
pub struct ResultReaderAdapter {
    inner: Box<dyn ResultReader + Send>,
    done: bool,
}

impl ResultReaderAdapter {
    pub fn new(inner: Box<dyn ResultReader + Send>) -> Self {
        Self { inner, done: false }
    }

    pub fn compressed_bytes(&self) -> u64 {
        self.inner.compressed_bytes()
    }
}

impl Iterator for ResultReaderAdapter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                // an error ends iteration
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::EncodingPolicy;
    use rmpv::Value;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    fn payload(values: &[Value]) -> Vec<u8> {
        let mut buf = Vec::new();
        for v in values {
            rmpv::encode::write_value(&mut buf, v).unwrap();
        }
        buf
    }

    /// Reader that yields a fixed list then fails.
    struct MockReader {
        records: Vec<Record>,
        fail_at_end: bool,
    }

    impl ResultReader for MockReader {
        fn next_record(&mut self) -> Result<Option<Record>> {
            if self.records.is_empty() {
                if self.fail_at_end {
                    return Err(Error::Transport("mock failure".to_string()));
                }
                return Ok(None);
            }
            Ok(Some(self.records.remove(0)))
        }

        fn compressed_bytes(&self) -> u64 {
            0
        }
    }

    #[test]
    fn test_blocking_reader_iterates() {
        let rt = runtime();
        let values = vec![Value::from(1), Value::from(2), Value::from(3)];
        let source = MemoryFragmentSource::chunked(None, &payload(&values), 2);
        let stream = ResultStream::open(source, EncodingPolicy::Explicit).unwrap();
        let reader = BlockingResultReader::new(stream, rt.handle().clone());

        let records: Result<Vec<Record>> = reader.collect();
        assert_eq!(records.unwrap(), values);
    }

    #[test]
    fn test_blocking_reader_progress() {
        let rt = runtime();
        let bytes = payload(&[Value::from(1), Value::from(2)]);
        let source =
            MemoryFragmentSource::new(None, vec![bytes[..1].to_vec(), bytes[1..].to_vec()]);
        let stream = ResultStream::open(source, EncodingPolicy::Explicit).unwrap();
        let mut reader = BlockingResultReader::new(stream, rt.handle().clone());

        let first = reader.next_record_with_progress().unwrap().unwrap();
        assert_eq!(first.compressed_bytes, 1);
        let second = reader.next_record_with_progress().unwrap().unwrap();
        assert_eq!(second.compressed_bytes, 2);
        assert!(reader.next_record_with_progress().unwrap().is_none());
        assert_eq!(reader.compressed_bytes(), 2);
    }

    #[test]
    fn test_channel_reader() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let values: Vec<Value> = (0..20).map(Value::from).collect();
        let source = MemoryFragmentSource::chunked(None, &payload(&values), 3);
        let stream = ResultStream::open(source, EncodingPolicy::Explicit).unwrap();
        let receiver = spawn_record_channel(stream, 2, rt.handle());

        let mut adapter = ResultReaderAdapter::new(Box::new(ChannelResultReader::new(receiver)));
        let records: Vec<Record> = adapter.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(records, values);
        assert_eq!(adapter.compressed_bytes(), payload(&values).len() as u64);
    }

    #[test]
    fn test_adapter_stops_after_error() {
        let mut adapter = ResultReaderAdapter::new(Box::new(MockReader {
            records: vec![Value::from("a")],
            fail_at_end: true,
        }));
        assert!(adapter.next().unwrap().is_ok());
        assert!(adapter.next().unwrap().is_err());
        assert!(adapter.next().is_none());
    }
}
