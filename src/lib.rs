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

pub mod network;
pub mod service;

pub use network::{Accept, BlockingLines, Delimiter, LineCodec, LineRecord, StreamReader};
pub use service::{
    global_config, level_for_verbosity, setup_local_tracing, setup_tracing, AppError, AppResult,
    CloseReason, ConnectionEvent, LineServerConfig, LineService, LineSink, LogConfig,
    NetworkConfig, ReaderConfig, RuntimeConfig, Server, Shutdown, StdoutSink, GLOBAL_CONFIG,
};
