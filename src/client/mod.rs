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

//! Client implementations for communicating with the job API.
//!
//! This module provides:
//! - `TdHttpClient`: Low-level HTTP client with retry logic
//! - `JobClient`: Job control-plane calls and result fetch entry points

pub mod http;
pub mod jobs;

pub use http::{HttpClientConfig, TdHttpClient};
pub use jobs::JobClient;
