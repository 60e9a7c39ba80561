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

//! Error types for job API calls and result streaming.
//!
//! Every fetch call fails with one of the decode kinds
//! ([`ErrorKind::RequestFailed`], [`ErrorKind::CorruptStream`],
//! [`ErrorKind::TruncatedRecord`]) or with a transport, sink or handler
//! failure. Records delivered before an error stay delivered.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the job client and the result pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The server answered with a non-success status; nothing was streamed.
    #[error("request failed: HTTP {status} - {message}")]
    RequestFailed { status: u16, message: String },

    /// The decompressor or the record decoder rejected the byte stream.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// The stream ended while a record was only partially received.
    #[error("truncated record: stream ended with {pending} undecoded bytes")]
    TruncatedRecord { pending: usize },

    /// The HTTP layer failed to connect or to deliver the body.
    #[error("transport error: {0}")]
    Transport(String),

    /// Writing decompressed bytes to the caller's sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A control-plane response body could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A job's result schema could not be parsed.
    #[error("invalid result schema: {0}")]
    InvalidSchema(String),

    /// A configuration option was missing or malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A caller-supplied record handler returned an error.
    #[error("record handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The consumer cancelled the stream.
    #[error("result stream cancelled")]
    Cancelled,
}

/// Discriminant of [`Error`], convenient for matching without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RequestFailed,
    CorruptStream,
    TruncatedRecord,
    Transport,
    Io,
    InvalidResponse,
    InvalidSchema,
    InvalidConfig,
    Handler,
    Cancelled,
}

impl Error {
    /// Wrap an arbitrary handler error so it can abort a stream.
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Handler(err.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RequestFailed { .. } => ErrorKind::RequestFailed,
            Error::CorruptStream(_) => ErrorKind::CorruptStream,
            Error::TruncatedRecord { .. } => ErrorKind::TruncatedRecord,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Io(_) => ErrorKind::Io,
            Error::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Error::InvalidSchema(_) => ErrorKind::InvalidSchema,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::Handler(_) => ErrorKind::Handler,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True for the three decode failures of a result fetch.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RequestFailed | ErrorKind::CorruptStream | ErrorKind::TruncatedRecord
        )
    }

    /// Prefix the message of a request or transport failure with the
    /// operation that failed. Other kinds are returned unchanged.
    pub fn context(self, context: &str) -> Self {
        match self {
            Error::RequestFailed { status, message } => Error::RequestFailed {
                status,
                message: format!("{}: {}", context, message),
            },
            Error::Transport(message) => Error::Transport(format!("{}: {}", context, message)),
            other => other,
        }
    }

    /// True when the request itself could be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RequestFailed { .. } | Error::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = Error::RequestFailed {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::RequestFailed);
        assert!(err.is_decode_error());
        assert!(err.is_retryable());

        let err = Error::TruncatedRecord { pending: 40 };
        assert_eq!(err.kind(), ErrorKind::TruncatedRecord);
        assert!(err.is_decode_error());
        assert!(!err.is_retryable());

        assert!(!Error::Cancelled.is_decode_error());
    }

    #[test]
    fn test_display() {
        let err = Error::RequestFailed {
            status: 404,
            message: "job not found".to_string(),
        };
        assert_eq!(err.to_string(), "request failed: HTTP 404 - job not found");

        let err = Error::TruncatedRecord { pending: 41 };
        assert_eq!(
            err.to_string(),
            "truncated record: stream ended with 41 undecoded bytes"
        );
    }

    #[test]
    fn test_handler_wraps_source() {
        let err = Error::handler("disk full");
        assert_eq!(err.kind(), ErrorKind::Handler);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "record handler failed: disk full");
    }

    #[test]
    fn test_context_prefixes_request_errors() {
        let err = Error::RequestFailed {
            status: 404,
            message: "not found".to_string(),
        }
        .context("Show job failed");
        assert_eq!(
            err.to_string(),
            "request failed: HTTP 404 - Show job failed: not found"
        );

        let err = Error::TruncatedRecord { pending: 1 }.context("ignored");
        assert!(matches!(err, Error::TruncatedRecord { pending: 1 }));
    }

    #[test]
    fn test_io_from() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
