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

//! Job API client.
//!
//! Control-plane calls (`list_jobs`, `show_job`, `job_status`, `kill`,
//! `query`) are single JSON request/response exchanges. Result calls open the
//! `/v3/job/result/{id}` body as a [`HttpFragmentSource`] and hand it to the
//! result pipeline in `crate::reader`.

use crate::client::http::{HttpClientConfig, TdHttpClient};
use crate::config::ResultConfig;
use crate::error::{Error, Result};
use crate::reader::{
    spawn_record_channel, HttpFragmentSource, RawStream, RecordReceiver, ResultStream,
};
use crate::schema::parse_result_schema;
use crate::types::job::{
    IssueJobResponse, JobListResponse, JobStatusResponse, KillJobResponse, ShowJobResponse,
};
use crate::types::{
    JobDetails, JobResult, JobSummary, JobType, ListJobsParams, QueryOptions, Record, ResultFormat,
};
use bytes::Bytes;
use reqwest::header::ACCEPT_ENCODING;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

/// `Accept-Encoding` sent for record fetches; both codings are decoded.
const RECORD_ACCEPT_ENCODING: &str = "gzip, deflate";
/// `Accept-Encoding` sent for raw fetches under the explicit policy.
const RAW_ACCEPT_ENCODING: &str = "gzip";

/// Client for the `/v3/job` API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct JobClient {
    http_client: Arc<TdHttpClient>,
    base_url: Url,
    result_config: ResultConfig,
}

impl JobClient {
    /// Create a client for `endpoint` authenticating with `apikey`.
    pub fn new(
        endpoint: &str,
        apikey: &str,
        http_config: HttpClientConfig,
        result_config: ResultConfig,
    ) -> Result<Self> {
        let base_url = Url::parse(endpoint).map_err(|e| {
            Error::InvalidConfig(format!("invalid endpoint '{}': {}", endpoint, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "invalid endpoint '{}': not a base URL",
                endpoint
            )));
        }
        let http_client = Arc::new(TdHttpClient::new(http_config, apikey)?);
        Ok(Self {
            http_client,
            base_url,
            result_config,
        })
    }

    pub fn result_config(&self) -> &ResultConfig {
        &self.result_config
    }

    pub fn http_client(&self) -> &TdHttpClient {
        &self.http_client
    }

    /// Endpoint URL with `segments` appended, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidConfig(format!("invalid endpoint '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let request = request
            .timeout(self.http_client.config().request_timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build request: {}", e)))?;
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| e.context(context))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("{}: failed to read response: {}", context, e)))?;
        serde_json::from_slice(&body).map_err(|e| {
            Error::InvalidResponse(format!(
                "{}: {} - body: {}",
                context,
                e,
                String::from_utf8_lossy(&body)
            ))
        })
    }

    // --- Control plane ---

    /// `GET /v3/job/list`.
    pub async fn list_jobs(&self, params: &ListJobsParams) -> Result<Vec<JobSummary>> {
        let url = self.url(&["v3", "job", "list"])?;
        debug!("Listing jobs at {}", url.path());

        let request = self
            .http_client
            .inner()
            .request(Method::GET, url)
            .query(&params.to_query());
        let list: JobListResponse = self.read_json(request, "List jobs failed").await?;

        debug!("Listed {} jobs", list.jobs.len());
        Ok(list.jobs)
    }

    /// `GET /v3/job/show/{id}`, with the result schema parsed.
    pub async fn show_job(&self, job_id: &str) -> Result<JobDetails> {
        let url = self.url(&["v3", "job", "show", job_id])?;
        debug!("Showing job {}", job_id);

        let request = self.http_client.inner().request(Method::GET, url);
        let show: ShowJobResponse = self.read_json(request, "Show job failed").await?;

        let result_schema = match show.hive_result_schema.as_deref() {
            Some(raw) => parse_result_schema(raw, show.job_type)?,
            None => None,
        };

        Ok(JobDetails {
            job_type: show.job_type,
            database: show.database,
            query: show.query,
            status: show.status,
            url: show.url,
            debug: show.debug,
            start_at: show.start_at,
            end_at: show.end_at,
            cpu_time: show.cpu_time,
            result_size: show.result_size,
            result_url: show.result,
            result_schema,
            priority: show.priority,
            retry_limit: show.retry_limit,
        })
    }

    /// `GET /v3/job/status/{id}`.
    pub async fn job_status(&self, job_id: &str) -> Result<String> {
        let url = self.url(&["v3", "job", "status", job_id])?;
        let request = self.http_client.inner().request(Method::GET, url);
        let status: JobStatusResponse = self.read_json(request, "Get job status failed").await?;
        debug!("Job {} status: {}", job_id, status.status);
        Ok(status.status)
    }

    /// `POST /v3/job/kill/{id}`. Returns the status the job had before.
    pub async fn kill(&self, job_id: &str) -> Result<Option<String>> {
        let url = self.url(&["v3", "job", "kill", job_id])?;
        let request = self.http_client.inner().request(Method::POST, url);
        let killed: KillJobResponse = self.read_json(request, "Kill job failed").await?;
        info!(
            "Killed job {} (former status {:?})",
            job_id, killed.former_status
        );
        Ok(killed.former_status)
    }

    /// `POST /v3/job/issue/{type}/{db}`. Returns the new job id.
    pub async fn query(
        &self,
        sql: &str,
        job_type: JobType,
        database: &str,
        options: &QueryOptions,
    ) -> Result<String> {
        if job_type == JobType::Unknown {
            return Err(Error::InvalidConfig(
                "cannot issue a job with an unknown type".to_string(),
            ));
        }
        let url = self.url(&["v3", "job", "issue", job_type.as_str(), database])?;
        debug!("Issuing {} job on database {}", job_type, database);

        let request = self
            .http_client
            .inner()
            .request(Method::POST, url)
            .form(&options.to_form(sql));
        let issued: IssueJobResponse = self.read_json(request, "Query failed").await?;

        info!("Issued {} job {}", job_type, issued.job_id);
        Ok(issued.job_id)
    }

    /// `GET /v3/job/result/{id}` as one body, exactly as delivered.
    pub async fn result_raw(&self, job_id: &str, format: &ResultFormat) -> Result<Bytes> {
        let response = self.open_result(job_id, format, None).await?;
        response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("Get job result failed: {}", e)))
    }

    // --- Result streaming ---

    /// Open the result body. Only the idle read timeout applies, so the
    /// download may take as long as the body keeps flowing.
    async fn open_result(
        &self,
        job_id: &str,
        format: &ResultFormat,
        accept_encoding: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = self.url(&["v3", "job", "result", job_id])?;
        debug!("Fetching result of job {} (format={})", job_id, format);

        let mut request = self
            .http_client
            .inner()
            .request(Method::GET, url)
            .query(&[("format", format.as_str())]);
        if let Some(encoding) = accept_encoding {
            request = request.header(ACCEPT_ENCODING, encoding);
        }
        let request = request
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build request: {}", e)))?;

        self.http_client
            .execute(request)
            .await
            .map_err(|e| e.context("Get job result failed"))
    }

    /// Open a record stream over the job's `msgpack` result.
    pub async fn result_stream(&self, job_id: &str) -> Result<ResultStream<HttpFragmentSource>> {
        let response = self
            .open_result(job_id, &ResultFormat::MessagePack, Some(RECORD_ACCEPT_ENCODING))
            .await?;
        let source = HttpFragmentSource::new(response);
        if let Some(len) = source.content_length() {
            debug!("Result of job {}: {} compressed bytes expected", job_id, len);
        }
        ResultStream::open(source, self.result_config.record_policy)
    }

    /// Open a raw byte stream over the job's result in `format`.
    pub async fn raw_stream(
        &self,
        job_id: &str,
        format: &ResultFormat,
    ) -> Result<RawStream<HttpFragmentSource>> {
        let response = self
            .open_result(job_id, format, Some(RAW_ACCEPT_ENCODING))
            .await?;
        RawStream::open(
            HttpFragmentSource::new(response),
            self.result_config.raw_policy,
        )
    }

    /// Stream the job's records through a bounded channel fed by a spawned
    /// task on the current runtime.
    pub async fn result_channel(&self, job_id: &str) -> Result<RecordReceiver> {
        let stream = self.result_stream(job_id).await?;
        Ok(spawn_record_channel(
            stream,
            self.result_config.channel_capacity,
            &tokio::runtime::Handle::current(),
        ))
    }

    /// Collect the whole result. `msgpack` is decoded into records; any
    /// other format is returned as decompressed bytes.
    pub async fn fetch_all(&self, job_id: &str, format: &ResultFormat) -> Result<JobResult> {
        if format.is_record_stream() {
            let records = self.result_stream(job_id).await?.collect().await?;
            info!("Fetched {} records for job {}", records.len(), job_id);
            Ok(JobResult::Records(records))
        } else {
            let bytes = self.raw_stream(job_id, format).await?.collect_bytes().await?;
            info!("Fetched {} bytes for job {}", bytes.len(), job_id);
            Ok(JobResult::Raw(bytes))
        }
    }

    /// Call `handler` once per record of the job's `msgpack` result.
    pub async fn fetch_each<F>(&self, job_id: &str, handler: F) -> Result<()>
    where
        F: FnMut(Record) -> Result<()>,
    {
        self.result_stream(job_id).await?.for_each(handler).await
    }

    /// Like [`fetch_each`](Self::fetch_each), also passing the compressed
    /// bytes received when each record became available.
    pub async fn fetch_each_with_progress<F>(&self, job_id: &str, handler: F) -> Result<()>
    where
        F: FnMut(Record, u64) -> Result<()>,
    {
        self.result_stream(job_id)
            .await?
            .for_each_with_progress(handler)
            .await
    }

    /// Write the decompressed result to `sink`, returning the compressed
    /// byte total.
    pub async fn fetch_raw_into<W>(
        &self,
        job_id: &str,
        format: &ResultFormat,
        sink: &mut W,
        progress: Option<&mut (dyn FnMut(u64) + Send)>,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.raw_stream(job_id, format)
            .await?
            .copy_into(sink, progress)
            .await
    }
}
