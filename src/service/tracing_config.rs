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

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::config::LogConfig;
use super::{AppError, AppResult};

fn timer() -> ChronoLocal {
    ChronoLocal::new("%Y-%m-%d %H:%M:%S%.6f".to_string())
}

// RUST_LOG wins over the level picked on the command line
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Maps the `-v` count of the command line to a filter directive.
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Stdout-only subscriber, used by tests and the `read` command.
pub fn setup_local_tracing() -> AppResult<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer())
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_line_number(true);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter("info"))
        .try_init()
        .map_err(|e| AppError::IllegalStateError(format!("tracing setup failed: {}", e)))
}

/// Writes to stdout and to an hourly rolling file under `log.dir`.
///
/// The returned guard flushes the file writer on drop; keep it alive until
/// the process exits.
pub fn setup_tracing(log: &LogConfig, default_level: &str) -> AppResult<WorkerGuard> {
    let file_appender = tracing_appender::rolling::hourly(&log.dir, &log.file_prefix);
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);

    // 创建同时写入到控制台和文件的写入器
    let writer = non_blocking.and(std::io::stdout);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer())
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(default_level))
        .try_init()
        .map_err(|e| AppError::IllegalStateError(format!("tracing setup failed: {}", e)))?;

    Ok(worker_guard)
}
