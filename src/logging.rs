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

//! Logging setup for the job client.
//!
//! Installs a `tracing-subscriber` with file or stderr output. Library code
//! only emits `tracing` events; nothing is printed unless this runs (or the
//! application installs its own subscriber).
//!
//! ## Configuration priority
//!
//! 1. `td.log_level` / `td.log_file` client options (highest)
//! 2. `RUST_LOG` environment variable
//! 3. Default: `warn`
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=td_job_results=debug ./my_app
//! ```
//!
//! Or programmatically:
//! ```ignore
//! config.set_option("td.log_level", "debug")?;
//! config.set_option("td.log_file", "/tmp/td.log")?;
//! ```

use std::sync::OnceLock;
use tracing_subscriber::{
    fmt::{self, time::SystemTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Logging configuration set through client options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Log level: "OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE".
    pub level: Option<String>,
    /// Log file path. If unset, logs go to stderr.
    pub file: Option<String>,
}

impl LogConfig {
    /// Filter directive for the configured level, or `None` when the level
    /// is unset or `off`.
    pub fn directive(&self) -> Option<String> {
        match self.level.as_deref() {
            Some(level) if !level.eq_ignore_ascii_case("off") => {
                Some(format!("td_job_results={}", level.to_lowercase()))
            }
            _ => None,
        }
    }

    pub fn is_off(&self) -> bool {
        self.level
            .as_deref()
            .is_some_and(|level| level.eq_ignore_ascii_case("off"))
    }
}

/// Initialize the tracing subscriber.
///
/// Runs at most once per process: the first `ClientConfig::connect()`
/// configures logging and later calls are no-ops. If the application already
/// installed a global subscriber, that one stays.
pub fn init_logging(config: &LogConfig) {
    LOGGING_INITIALIZED.get_or_init(|| {
        if config.is_off() {
            return;
        }

        let filter = match config.directive() {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("td_job_results=warn")),
        };

        if let Some(ref path) = config.file {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("td-job-results: failed to open log file {}: {}", path, e);
                    return;
                }
            };

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(file)
                        .with_target(false)
                        .with_ansi(false)
                        .with_timer(SystemTime),
                )
                .try_init()
                .ok();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_timer(SystemTime),
                )
                .try_init()
                .ok();
        }
    });
}
