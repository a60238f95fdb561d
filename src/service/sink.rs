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

use std::future::Future;
use std::io::{self, Write};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::network::LineRecord;

/// Why a connection's reader stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    EndOfStream,
    Shutdown,
    Error(String),
}

/// Lifecycle of one accepted connection as seen by a consumer.
///
/// For every connection the acceptor emits `Accepted`, then its lines in
/// stream order, then exactly one `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Accepted {
        connection_id: u64,
        peer: String,
    },
    Line {
        connection_id: u64,
        line: LineRecord,
    },
    Closed {
        connection_id: u64,
        peer: String,
        reason: CloseReason,
    },
}

impl ConnectionEvent {
    pub fn connection_id(&self) -> u64 {
        match self {
            ConnectionEvent::Accepted { connection_id, .. }
            | ConnectionEvent::Line { connection_id, .. }
            | ConnectionEvent::Closed { connection_id, .. } => *connection_id,
        }
    }
}

/// Consumer shared by every connection handler.
///
/// Handlers call `deliver` concurrently, so implementations serialize
/// whatever shared state they write to.
pub trait LineSink: Send + Sync + 'static {
    fn deliver(&self, event: ConnectionEvent) -> impl Future<Output = ()> + Send;
}

/// Funnels all events into one channel. Events are dropped once the
/// receiver is gone.
impl LineSink for mpsc::Sender<ConnectionEvent> {
    async fn deliver(&self, event: ConnectionEvent) {
        if let Err(e) = self.send(event).await {
            trace!("event receiver closed, dropping {:?}", e.0);
        }
    }
}

/// Prints every event to stdout, one line per event.
pub struct StdoutSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl StdoutSink {
    pub fn new() -> Self {
        StdoutSink::with_writer(io::stdout())
    }

    /// Renders into `out` instead of stdout.
    pub fn with_writer<W: Write + Send + 'static>(out: W) -> Self {
        StdoutSink {
            out: Mutex::new(Box::new(out)),
        }
    }

    fn render(event: &ConnectionEvent) -> String {
        match event {
            ConnectionEvent::Accepted {
                connection_id,
                peer,
            } => format!("[{}] connection accepted from {}", connection_id, peer),
            ConnectionEvent::Line {
                connection_id,
                line,
            } => format!("[{}] {}", connection_id, line),
            ConnectionEvent::Closed {
                connection_id,
                peer,
                reason: CloseReason::Error(e),
            } => format!("[{}] connection from {} failed: {}", connection_id, peer, e),
            ConnectionEvent::Closed {
                connection_id,
                peer,
                ..
            } => format!("[{}] connection from {} closed", connection_id, peer),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        StdoutSink::new()
    }
}

impl LineSink for StdoutSink {
    async fn deliver(&self, event: ConnectionEvent) {
        let rendered = StdoutSink::render(&event);
        let mut out = self.out.lock();
        // a closed stdout must not take the connection down
        if let Err(e) = writeln!(out, "{}", rendered).and_then(|_| out.flush()) {
            trace!("stdout write failed, dropping {:?}: {}", rendered, e);
        }
    }
}

impl std::fmt::Debug for StdoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdoutSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    // fails the first `failures` writes, then behaves
    struct FlakyWriter {
        failures: usize,
        inner: SharedBuf,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_render_events() {
        let accepted = ConnectionEvent::Accepted {
            connection_id: 7,
            peer: "127.0.0.1:5000".to_string(),
        };
        assert_eq!(
            StdoutSink::render(&accepted),
            "[7] connection accepted from 127.0.0.1:5000"
        );

        let line = ConnectionEvent::Line {
            connection_id: 7,
            line: LineRecord::from(Bytes::from_static(b"hello")),
        };
        assert_eq!(StdoutSink::render(&line), "[7] hello");

        let failed = ConnectionEvent::Closed {
            connection_id: 7,
            peer: "p".to_string(),
            reason: CloseReason::Error("reset".to_string()),
        };
        assert_eq!(StdoutSink::render(&failed), "[7] connection from p failed: reset");
        assert_eq!(failed.connection_id(), 7);
    }

    #[tokio::test]
    async fn test_writer_sink_renders_one_line_per_event() {
        let buf = SharedBuf::default();
        let sink = StdoutSink::with_writer(buf.clone());
        sink.deliver(ConnectionEvent::Line {
            connection_id: 3,
            line: LineRecord::from(Bytes::from_static(b"a")),
        })
        .await;
        sink.deliver(ConnectionEvent::Closed {
            connection_id: 3,
            peer: "p".to_string(),
            reason: CloseReason::EndOfStream,
        })
        .await;
        assert_eq!(
            String::from_utf8_lossy(&buf.0.lock()),
            "[3] a\n[3] connection from p closed\n"
        );
    }

    #[tokio::test]
    async fn test_failed_write_keeps_sink_usable() {
        let buf = SharedBuf::default();
        let sink = StdoutSink::with_writer(FlakyWriter {
            failures: 1,
            inner: buf.clone(),
        });
        // first event hits the broken writer and is dropped
        sink.deliver(ConnectionEvent::Line {
            connection_id: 1,
            line: LineRecord::from(Bytes::from_static(b"lost")),
        })
        .await;
        sink.deliver(ConnectionEvent::Line {
            connection_id: 1,
            line: LineRecord::from(Bytes::from_static(b"kept")),
        })
        .await;
        assert_eq!(String::from_utf8_lossy(&buf.0.lock()), "[1] kept\n");
    }

    #[tokio::test]
    async fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        tx.deliver(ConnectionEvent::Accepted {
            connection_id: 1,
            peer: "p".to_string(),
        })
        .await;
    }
}
