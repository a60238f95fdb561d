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

use std::time::Duration;

pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by readers, the acceptor and the service wiring.
///
/// End of stream is never an error: readers report it as `Ok(None)` or by
/// ending their sequence.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// read failure from a byte source
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// non-recoverable accept failure, the accept loop stops
    #[error("Accept error = {0}")]
    Accept(String),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// line reassembly errors
    #[error("line of length {0} exceeds the limit of {1} bytes")]
    LineTooLong(usize, usize),

    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),
}
