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

//! Compressed-byte accounting for progress reporting.

use crate::error::Result;
use crate::reader::source::FragmentSource;
use async_trait::async_trait;
use bytes::Bytes;

/// Wraps a [`FragmentSource`] and counts the bytes it delivers.
///
/// Counts are taken before decompression, so they track the transfer rather
/// than the decoded size. The tracker never looks inside a fragment.
#[derive(Debug)]
pub struct ProgressTracker<S> {
    inner: S,
    compressed_bytes: u64,
    fragments: u64,
}

impl<S: FragmentSource> ProgressTracker<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            compressed_bytes: 0,
            fragments: 0,
        }
    }

    /// Total compressed bytes observed so far.
    pub fn compressed_bytes(&self) -> u64 {
        self.compressed_bytes
    }

    /// Number of fragments observed so far.
    pub fn fragments(&self) -> u64 {
        self.fragments
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: FragmentSource> FragmentSource for ProgressTracker<S> {
    fn status(&self) -> u16 {
        self.inner.status()
    }

    fn content_encoding(&self) -> Option<&str> {
        self.inner.content_encoding()
    }

    async fn next_fragment(&mut self) -> Result<Option<Bytes>> {
        let fragment = self.inner.next_fragment().await?;
        if let Some(ref bytes) = fragment {
            self.compressed_bytes += bytes.len() as u64;
            self.fragments += 1;
        }
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::source::MemoryFragmentSource;

    #[tokio::test]
    async fn test_counts_fragment_lengths() {
        let source = MemoryFragmentSource::new(
            Some("gzip"),
            vec![vec![0u8; 10], vec![0u8; 1], vec![0u8; 7]],
        );
        let mut tracker = ProgressTracker::new(source);
        assert_eq!(tracker.content_encoding(), Some("gzip"));

        let mut seen = Vec::new();
        while tracker.next_fragment().await.unwrap().is_some() {
            seen.push(tracker.compressed_bytes());
        }
        assert_eq!(seen, vec![10, 11, 18]);
        assert_eq!(tracker.fragments(), 3);

        // end of stream does not move the counter
        assert!(tracker.next_fragment().await.unwrap().is_none());
        assert_eq!(tracker.compressed_bytes(), 18);
    }

    #[tokio::test]
    async fn test_preserves_content() {
        let source = MemoryFragmentSource::new(None, vec![&b"hello"[..], &b" world"[..]]);
        let mut tracker = ProgressTracker::new(source);
        assert_eq!(tracker.next_fragment().await.unwrap().unwrap(), "hello");
        assert_eq!(tracker.next_fragment().await.unwrap().unwrap(), " world");
    }
}
