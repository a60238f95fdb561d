// Copyright 2025 jonefeewang@gmail.com
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

extern crate config as _;

use std::path::Path;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};
use crate::network::Delimiter;

pub static GLOBAL_CONFIG: OnceCell<LineServerConfig> = OnceCell::new();

/// Returns the process-wide configuration.
///
/// # Panics
///
/// Panics when called before the binary has stored a config in
/// [`GLOBAL_CONFIG`].
pub fn global_config() -> &'static LineServerConfig {
    GLOBAL_CONFIG.get().expect("global config is not initialized")
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    /// Maximum number of concurrently served connections, 0 for no limit.
    pub max_connection: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "127.0.0.1".to_string(),
            port: 42069,
            max_connection: 0,
        }
    }
}

/// Settings of a single stream reader.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ReaderConfig {
    /// Byte sequence terminating a line, e.g. "\n" or "\r\n".
    pub delimiter: String,
    /// Size of each read from the byte source.
    pub chunk_size: usize,
    /// Upper bound for a single line, 0 for no limit.
    pub max_line_length: usize,
    /// Deadline for a single read in milliseconds, 0 waits forever.
    pub read_timeout_ms: u64,
    /// Capacity of the channel behind a line stream.
    pub channel_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            delimiter: "\n".to_string(),
            chunk_size: 4 * 1024,
            max_line_length: 64 * 1024,
            read_timeout_ms: 0,
            channel_capacity: 64,
        }
    }
}

impl ReaderConfig {
    pub fn delimiter(&self) -> AppResult<Delimiter> {
        Delimiter::new(self.delimiter.clone().into_bytes())
    }

    pub fn max_line_length(&self) -> Option<usize> {
        (self.max_line_length > 0).then_some(self.max_line_length)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn validate(&self) -> AppResult<()> {
        self.delimiter()?;
        if self.chunk_size == 0 {
            return Err(AppError::InvalidValue(
                "reader.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(AppError::InvalidValue(
                "reader.channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Directory of the hourly rolling log files.
    pub dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: "logs".to_string(),
            file_prefix: "linestream.log".to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 0 uses one worker per cpu
    pub worker_threads: usize,
}

impl RuntimeConfig {
    pub fn worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LineServerConfig {
    pub network: NetworkConfig,
    pub reader: ReaderConfig,
    pub log: LogConfig,
    pub runtime: RuntimeConfig,
}

impl LineServerConfig {
    /// Loads the config file at `path`, then applies `LINESTREAM__<SECTION>__<KEY>`
    /// environment overrides on top of it.
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<LineServerConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(
                config::Environment::with_prefix("LINESTREAM")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let server_config: LineServerConfig = config.try_deserialize()?;
        server_config.reader.validate()?;

        Ok(server_config)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.ip, self.network.port)
    }
}
