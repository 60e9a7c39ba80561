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

//! Fragment sources: the raw, still-compressed body of a result response.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_ENCODING;
use reqwest::Response;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Forward-only reader over the body of one result response.
///
/// Status and content-encoding are known before the first fragment and do not
/// change for the lifetime of the source.
#[async_trait]
pub trait FragmentSource: Send {
    /// HTTP status code of the response.
    fn status(&self) -> u16;

    /// Value of the `Content-Encoding` header, if any.
    fn content_encoding(&self) -> Option<&str>;

    /// Next chunk of the body, or `None` once the body is exhausted.
    async fn next_fragment(&mut self) -> Result<Option<Bytes>>;
}

/// Fragment source over a streaming `reqwest` response body.
#[derive(Debug)]
pub struct HttpFragmentSource {
    response: Response,
    status: u16,
    content_encoding: Option<String>,
}

impl HttpFragmentSource {
    pub fn new(response: Response) -> Self {
        let status = response.status().as_u16();
        let content_encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        Self {
            response,
            status,
            content_encoding,
        }
    }

    /// Expected body length from `Content-Length`, if the server sent one.
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }
}

#[async_trait]
impl FragmentSource for HttpFragmentSource {
    fn status(&self) -> u16 {
        self.status
    }

    fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    async fn next_fragment(&mut self) -> Result<Option<Bytes>> {
        self.response
            .chunk()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read result body: {}", e)))
    }
}

/// Fragment source replaying fragments held in memory.
///
/// Used for captured bodies and for exercising the pipeline without a
/// server. An optional error can be queued after the last fragment to model
/// a connection dropping mid-body.
#[derive(Debug)]
pub struct MemoryFragmentSource {
    status: u16,
    content_encoding: Option<String>,
    fragments: VecDeque<Bytes>,
    trailing_error: Option<String>,
    pulls: Arc<AtomicUsize>,
}

impl MemoryFragmentSource {
    /// A successful (200) response with the given encoding and fragments.
    pub fn new<I, B>(content_encoding: Option<&str>, fragments: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            status: 200,
            content_encoding: content_encoding.map(|s| s.to_string()),
            fragments: fragments.into_iter().map(Into::into).collect(),
            trailing_error: None,
            pulls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Split `payload` into fragments of `fragment_size` bytes (the last may
    /// be shorter).
    pub fn chunked(content_encoding: Option<&str>, payload: &[u8], fragment_size: usize) -> Self {
        let size = fragment_size.max(1);
        let fragments: Vec<Bytes> = payload
            .chunks(size)
            .map(Bytes::copy_from_slice)
            .collect();
        Self::new(content_encoding, fragments)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Fail with a transport error once all fragments have been delivered.
    pub fn with_trailing_error(mut self, message: impl Into<String>) -> Self {
        self.trailing_error = Some(message.into());
        self
    }

    /// Shared counter of `next_fragment` calls, readable after the source
    /// has been moved into a stream.
    pub fn pull_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.pulls)
    }
}

#[async_trait]
impl FragmentSource for MemoryFragmentSource {
    fn status(&self) -> u16 {
        self.status
    }

    fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    async fn next_fragment(&mut self) -> Result<Option<Bytes>> {
        self.pulls.fetch_add(1, Ordering::Relaxed);
        if let Some(fragment) = self.fragments.pop_front() {
            return Ok(Some(fragment));
        }
        match self.trailing_error.take() {
            Some(message) => Err(Error::Transport(message)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source_replays_in_order() {
        let mut source = MemoryFragmentSource::new(Some("gzip"), vec![&b"ab"[..], &b"c"[..]]);
        assert_eq!(source.status(), 200);
        assert_eq!(source.content_encoding(), Some("gzip"));
        assert_eq!(source.next_fragment().await.unwrap().unwrap(), "ab");
        assert_eq!(source.next_fragment().await.unwrap().unwrap(), "c");
        assert!(source.next_fragment().await.unwrap().is_none());
        assert_eq!(source.pull_counter().load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_memory_source_chunked() {
        let mut source = MemoryFragmentSource::chunked(None, b"abcdefg", 3);
        let mut sizes = Vec::new();
        while let Some(f) = source.next_fragment().await.unwrap() {
            sizes.push(f.len());
        }
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_memory_source_trailing_error() {
        let mut source =
            MemoryFragmentSource::new(None, vec![&b"x"[..]]).with_trailing_error("reset by peer");
        assert!(source.next_fragment().await.unwrap().is_some());
        let err = source.next_fragment().await.unwrap_err();
        assert!(matches!(err, Error::Transport(ref m) if m == "reset by peer"));
        assert!(source.next_fragment().await.unwrap().is_none());
    }
}
