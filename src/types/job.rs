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

//! Job API request/response types.
//!
//! These map directly to the JSON bodies of the `/v3/job/*` endpoints and are
//! used by `JobClient`.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;

/// Query engine that ran a job. Missing or unrecognized values map to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Hive,
    Pig,
    Presto,
    Impala,
    Bulkload,
    #[default]
    #[serde(other)]
    Unknown,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Hive => "hive",
            JobType::Pig => "pig",
            JobType::Presto => "presto",
            JobType::Impala => "impala",
            JobType::Bulkload => "bulkload",
            JobType::Unknown => "?",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `null` as well as a missing field for the job type.
fn deserialize_job_type<'de, D>(deserializer: D) -> Result<JobType, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<JobType>::deserialize(deserializer)?.unwrap_or_default())
}

/// Job ids arrive as strings from most endpoints and as numbers from some.
fn deserialize_job_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected job id string or number, got {}",
            other
        ))),
    }
}

/// One entry of `GET /v3/job/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSummary {
    #[serde(deserialize_with = "deserialize_job_id")]
    pub job_id: String,
    #[serde(default, rename = "type", deserialize_with = "deserialize_job_type")]
    pub job_type: JobType,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub end_at: Option<String>,
    #[serde(default)]
    pub cpu_time: Option<i64>,
    /// Compressed result size in msgpack.gz format.
    #[serde(default)]
    pub result_size: Option<i64>,
    /// Result export target URL.
    #[serde(default, rename = "result")]
    pub result_url: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub retry_limit: Option<i64>,
}

/// Body of `GET /v3/job/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
}

/// Body of `GET /v3/job/show/{id}`.
///
/// `hive_result_schema` is kept as raw text here; `JobClient::show_job`
/// parses it into [`JobDetails::result_schema`].
#[derive(Debug, Clone, Deserialize)]
pub struct ShowJobResponse {
    #[serde(default, rename = "type", deserialize_with = "deserialize_job_type")]
    pub job_type: JobType,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    pub status: String,
    #[serde(default)]
    pub debug: Option<serde_json::Value>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub end_at: Option<String>,
    #[serde(default)]
    pub cpu_time: Option<i64>,
    #[serde(default)]
    pub result_size: Option<i64>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub hive_result_schema: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub retry_limit: Option<i64>,
}

/// One column of a job's result schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub type_name: String,
}

/// Details of a single job.
#[derive(Debug, Clone)]
pub struct JobDetails {
    pub job_type: JobType,
    pub database: Option<String>,
    pub query: Option<String>,
    pub status: String,
    pub url: Option<String>,
    pub debug: Option<serde_json::Value>,
    pub start_at: Option<String>,
    pub end_at: Option<String>,
    pub cpu_time: Option<i64>,
    pub result_size: Option<i64>,
    pub result_url: Option<String>,
    /// `None` when the server reported no schema.
    pub result_schema: Option<Vec<ColumnSchema>>,
    pub priority: Option<i64>,
    pub retry_limit: Option<i64>,
}

/// Body of `GET /v3/job/status/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub status: String,
}

/// Body of `POST /v3/job/kill/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct KillJobResponse {
    #[serde(default)]
    pub former_status: Option<String>,
}

/// Body of `POST /v3/job/issue/{type}/{db}`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueJobResponse {
    #[serde(deserialize_with = "deserialize_job_id")]
    pub job_id: String,
}

/// Filters for `list_jobs`.
#[derive(Debug, Clone, Default)]
pub struct ListJobsParams {
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub status: Option<String>,
    /// Extra server-side conditions passed through as query parameters.
    pub conditions: HashMap<String, String>,
}

impl ListJobsParams {
    pub(crate) fn to_query(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        // `from` is always sent
        params.push(("from".to_string(), self.from.unwrap_or(0).to_string()));
        if let Some(to) = self.to {
            params.push(("to".to_string(), to.to_string()));
        }
        if let Some(ref status) = self.status {
            params.push(("status".to_string(), status.clone()));
        }
        let mut conditions: Vec<_> = self.conditions.iter().collect();
        conditions.sort();
        for (k, v) in conditions {
            params.push((k.clone(), v.clone()));
        }
        params
    }
}

/// Form keys owned by [`QueryOptions`] fields; never taken from `extra`.
const RESERVED_FORM_KEYS: [&str; 4] = ["query", "result", "priority", "retry_limit"];

/// Options for issuing a query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Where the server should export the result.
    pub result_url: Option<String>,
    pub priority: Option<i32>,
    pub retry_limit: Option<u32>,
    /// Additional form parameters passed through unchanged. Keys that name
    /// one of the fields above (`query`, `result`, `priority`,
    /// `retry_limit`) are ignored.
    pub extra: HashMap<String, String>,
}

impl QueryOptions {
    pub(crate) fn to_form(&self, query: &str) -> Vec<(String, String)> {
        let mut extra: Vec<_> = self
            .extra
            .iter()
            .filter(|(k, _)| !RESERVED_FORM_KEYS.contains(&k.as_str()))
            .collect();
        extra.sort();
        let mut form: Vec<(String, String)> = extra
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        form.push(("query".to_string(), query.to_string()));
        if let Some(ref url) = self.result_url {
            form.push(("result".to_string(), url.clone()));
        }
        if let Some(priority) = self.priority {
            form.push(("priority".to_string(), priority.to_string()));
        }
        if let Some(retry_limit) = self.retry_limit {
            form.push(("retry_limit".to_string(), retry_limit.to_string()));
        }
        form
    }
}
