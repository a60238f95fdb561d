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

//! Network Module Implementation
//!
//! This module turns raw byte streams into delimiter-framed lines and
//! abstracts the endpoint connections are accepted from.
//!
//! # Components
//!
//! - `LineCodec`: reassembles lines from arbitrarily split input
//! - `StreamReader`: drives the codec over an async byte source in fixed-size chunks
//! - `BlockingLines`: the same over `std::io::Read`
//! - `Accept`: a listening endpoint handing out connections
//!
//! # Features
//!
//! - Configurable, possibly multi-byte delimiters
//! - Bounded reassembly buffer
//! - Optional per-read deadline
//! - End of stream signalled by ending the sequence, never by a sentinel value

pub use line_codec::{Delimiter, LineCodec, LineRecord};
pub use listener::Accept;
pub use stream_reader::{BlockingLines, StreamReader};
mod line_codec;
mod listener;
mod stream_reader;
