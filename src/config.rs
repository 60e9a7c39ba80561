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

//! Client configuration.
//!
//! Options are set by string key, mirroring how callers usually carry
//! configuration (files, flags, environment):
//!
//! | key | type |
//! |-----|------|
//! | `td.endpoint` | URL or host name |
//! | `td.apikey` | string |
//! | `td.http.connect_timeout_ms` | integer |
//! | `td.http.read_timeout_ms` | integer |
//! | `td.http.request_timeout_ms` | integer |
//! | `td.http.max_retries` | integer |
//! | `td.http.retry_delay_ms` | integer |
//! | `td.result.record_decompression` | `assume-gzip` or `explicit` |
//! | `td.result.raw_decompression` | `assume-gzip` or `explicit` |
//! | `td.result.channel_capacity` | integer |
//! | `td.log_level` | `off`, `error`, `warn`, `info`, `debug`, `trace` |
//! | `td.log_file` | path |

use crate::client::{HttpClientConfig, JobClient};
use crate::error::{Error, Result};
use crate::logging::{init_logging, LogConfig};
use crate::types::EncodingPolicy;
use std::time::Duration;
use tracing::debug;

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://api.treasuredata.com";

/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "TD_API_KEY";
/// Environment variable holding the API endpoint.
pub const ENV_API_SERVER: &str = "TD_API_SERVER";

/// Result retrieval settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultConfig {
    /// Decompression policy for the record (msgpack) fetch modes.
    pub record_policy: EncodingPolicy,
    /// Decompression policy for raw fetches.
    pub raw_policy: EncodingPolicy,
    /// Capacity of the bounded channel used by `result_channel`.
    pub channel_capacity: usize,
}

impl Default for ResultConfig {
    fn default() -> Self {
        Self {
            record_policy: EncodingPolicy::AssumeGzip,
            raw_policy: EncodingPolicy::Explicit,
            channel_capacity: 16,
        }
    }
}

/// Everything needed to build a [`JobClient`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    endpoint: Option<String>,
    apikey: Option<String>,

    // HTTP client configuration
    pub http: HttpClientConfig,

    // Result retrieval configuration
    pub result: ResultConfig,

    // Logging configuration
    pub log: LogConfig,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration seeded from `TD_API_KEY` and `TD_API_SERVER`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            if !key.is_empty() {
                config.apikey = Some(key);
            }
        }
        if let Ok(server) = std::env::var(ENV_API_SERVER) {
            if !server.is_empty() {
                config.endpoint = Some(server);
            }
        }
        config
    }

    pub fn with_apikey(mut self, apikey: impl Into<String>) -> Self {
        self.apikey = Some(apikey.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Returns the configured API key.
    pub fn apikey(&self) -> Option<&str> {
        self.apikey.as_deref()
    }

    /// Returns the endpoint with a scheme, falling back to the default.
    pub fn endpoint(&self) -> String {
        let endpoint = self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT).trim();
        let endpoint = endpoint.trim_end_matches('/');
        if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{}", endpoint)
        }
    }

    fn parse_int_option(value: &str) -> Option<u64> {
        value.trim().parse::<u64>().ok()
    }

    fn invalid_option(key: &str, value: &str) -> Error {
        Error::InvalidConfig(format!("invalid value '{}' for option '{}'", value, key))
    }

    /// Set one option by key.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            // Core options
            "td.endpoint" => {
                if value.trim().is_empty() {
                    return Err(Self::invalid_option(key, value));
                }
                self.endpoint = Some(value.to_string());
                Ok(())
            }
            "td.apikey" => {
                self.apikey = Some(value.to_string());
                Ok(())
            }

            // HTTP client options
            "td.http.connect_timeout_ms" => {
                let v = Self::parse_int_option(value)
                    .ok_or_else(|| Self::invalid_option(key, value))?;
                self.http.connect_timeout = Duration::from_millis(v);
                Ok(())
            }
            "td.http.read_timeout_ms" => {
                let v = Self::parse_int_option(value)
                    .ok_or_else(|| Self::invalid_option(key, value))?;
                self.http.read_timeout = Duration::from_millis(v);
                Ok(())
            }
            "td.http.request_timeout_ms" => {
                let v = Self::parse_int_option(value)
                    .ok_or_else(|| Self::invalid_option(key, value))?;
                self.http.request_timeout = Duration::from_millis(v);
                Ok(())
            }
            "td.http.max_retries" => {
                let v = Self::parse_int_option(value)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| Self::invalid_option(key, value))?;
                self.http.max_retries = v;
                Ok(())
            }
            "td.http.retry_delay_ms" => {
                let v = Self::parse_int_option(value)
                    .ok_or_else(|| Self::invalid_option(key, value))?;
                self.http.retry_delay = Duration::from_millis(v);
                Ok(())
            }

            // Result options
            "td.result.record_decompression" => {
                self.result.record_policy = value.parse()?;
                Ok(())
            }
            "td.result.raw_decompression" => {
                self.result.raw_policy = value.parse()?;
                Ok(())
            }
            "td.result.channel_capacity" => {
                let v = Self::parse_int_option(value)
                    .and_then(|v| usize::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .ok_or_else(|| Self::invalid_option(key, value))?;
                self.result.channel_capacity = v;
                Ok(())
            }

            // Logging options
            "td.log_level" => {
                let level = value.trim().to_lowercase();
                if !matches!(
                    level.as_str(),
                    "off" | "error" | "warn" | "info" | "debug" | "trace"
                ) {
                    return Err(Self::invalid_option(key, value));
                }
                self.log.level = Some(level);
                Ok(())
            }
            "td.log_file" => {
                self.log.file = Some(value.to_string());
                Ok(())
            }

            _ => Err(Error::InvalidConfig(format!("unknown option '{}'", key))),
        }
    }

    /// Set several options, stopping at the first invalid one.
    pub fn set_options<'a>(
        &mut self,
        options: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<()> {
        for (key, value) in options {
            self.set_option(key, value)?;
        }
        Ok(())
    }

    /// Read an option back as a string. The API key is never returned.
    pub fn get_option(&self, key: &str) -> Result<String> {
        let not_set = || Error::InvalidConfig(format!("option '{}' is not set", key));
        match key {
            "td.endpoint" => Ok(self.endpoint()),
            "td.http.connect_timeout_ms" => Ok(self.http.connect_timeout.as_millis().to_string()),
            "td.http.read_timeout_ms" => Ok(self.http.read_timeout.as_millis().to_string()),
            "td.http.request_timeout_ms" => {
                Ok(self.http.request_timeout.as_millis().to_string())
            }
            "td.http.max_retries" => Ok(self.http.max_retries.to_string()),
            "td.http.retry_delay_ms" => Ok(self.http.retry_delay.as_millis().to_string()),
            "td.result.record_decompression" => {
                Ok(self.result.record_policy.as_str().to_string())
            }
            "td.result.raw_decompression" => Ok(self.result.raw_policy.as_str().to_string()),
            "td.result.channel_capacity" => Ok(self.result.channel_capacity.to_string()),
            "td.log_level" => self.log.level.clone().ok_or_else(not_set),
            "td.log_file" => self.log.file.clone().ok_or_else(not_set),
            _ => Err(Error::InvalidConfig(format!("unknown option '{}'", key))),
        }
    }

    /// Build a [`JobClient`], initializing logging first.
    pub fn connect(&self) -> Result<JobClient> {
        init_logging(&self.log);

        let apikey = self.apikey.as_deref().ok_or_else(|| {
            Error::InvalidConfig("apikey not set (set td.apikey or TD_API_KEY)".to_string())
        })?;
        let endpoint = self.endpoint();

        debug!("Creating job client for {}", endpoint);

        JobClient::new(&endpoint, apikey, self.http.clone(), self.result.clone())
    }
}
