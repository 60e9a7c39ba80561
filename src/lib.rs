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

//! Streaming job result client for Rust
//!
//! This crate fetches the results of asynchronous remote jobs, delivered as a
//! chunked and usually compressed HTTP body, and turns them into a sequence
//! of MessagePack records without buffering the whole payload.
//!
//! ## Overview
//!
//! ```text
//! HTTP body -> FragmentSource -> ProgressTracker -> Decompressor -> RecordDecoder
//! ```
//!
//! - [`JobClient`] - Job API calls and result fetch entry points
//! - [`ResultStream`] - Async pull, collect and callback access to records
//! - [`RawStream`] - Decompressed bytes for non-record formats
//! - [`spawn_record_channel`] - Bounded channel fed by a producer task
//! - [`BlockingResultReader`] - Iterator over records for synchronous callers
//!
//! ## Features
//!
//! - **Fragment independence**: records may span any number of body chunks
//! - **Transparent decompression**: gzip and zlib-wrapped deflate
//! - **Progress**: cumulative compressed byte counts alongside each record
//!
//! ## Example
//!
//! ```ignore
//! use td_job_results::{ClientConfig, ResultFormat};
//!
//! let client = ClientConfig::from_env().connect()?;
//! client
//!     .fetch_each_with_progress("12345", |record, bytes| {
//!         println!("{} ({} bytes so far)", record, bytes);
//!         Ok(())
//!     })
//!     .await?;
//!
//! let mut file = tokio::fs::File::create("result.csv").await?;
//! client
//!     .fetch_raw_into("12345", &ResultFormat::Csv, &mut file, None)
//!     .await?;
//! ```
//!
//! ## Configuration Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `td.endpoint` | `https://api.treasuredata.com` | API endpoint (`TD_API_SERVER`) |
//! | `td.apikey` | - | API key (`TD_API_KEY`) |
//! | `td.http.read_timeout_ms` | 60000 | Idle time allowed between reads of a body |
//! | `td.http.request_timeout_ms` | 60000 | Deadline for job API calls (not result downloads) |
//! | `td.http.max_retries` | 5 | Retries for 429/502/503/504 and connect errors |
//! | `td.http.retry_delay_ms` | 1500 | Base backoff delay, doubled per retry |
//! | `td.result.record_decompression` | `assume-gzip` | Codec selection for record fetches |
//! | `td.result.raw_decompression` | `explicit` | Codec selection for raw fetches |
//! | `td.result.channel_capacity` | 16 | Records buffered by `result_channel` |
//! | `td.log_level` | `warn` | Log level for `td_job_results` events |

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod reader;
pub mod schema;
pub mod types;

// Re-export main types
pub use client::{HttpClientConfig, JobClient, TdHttpClient};
pub use config::{ClientConfig, ResultConfig};
pub use error::{Error, ErrorKind, Result};

// Re-export the result pipeline
pub use reader::{
    spawn_record_channel, BlockingResultReader, ChannelResultReader, FragmentSource,
    HttpFragmentSource, MemoryFragmentSource, RawStream, RecordReceiver, ResultReader,
    ResultReaderAdapter, ResultStream,
};
pub use schema::parse_result_schema;
pub use types::{
    ColumnSchema, CompressionCodec, EncodingPolicy, JobDetails, JobResult, JobSummary, JobType,
    ListJobsParams, ProgressRecord, QueryOptions, Record, ResultFormat,
};
