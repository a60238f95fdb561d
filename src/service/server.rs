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

use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, warn};

use crate::network::{Accept, StreamReader};
use crate::{AppError, AppResult, ReaderConfig};

use super::sink::{CloseReason, ConnectionEvent, LineSink};
use super::Shutdown;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

const INITIAL_ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Accept errors that say nothing about the health of the listener itself.
fn is_transient_accept_error(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::OutOfMemory
    ) {
        return true;
    }
    // ENOMEM, ENFILE, EMFILE
    #[cfg(unix)]
    {
        if matches!(err.raw_os_error(), Some(12) | Some(23) | Some(24)) {
            return true;
        }
    }
    false
}

// handler for each connection
struct ConnectionHandler<C, K> {
    // subscribed before the handler task is spawned, so a broadcast sent
    // right after `run` is dropped still reaches this connection
    shutdown: Shutdown,
    _shutdown_complete_tx: mpsc::Sender<()>,
    connection_id: u64,
    peer: String,
    reader: StreamReader<C>,
    sink: Arc<K>,
}

impl<C, K> ConnectionHandler<C, K>
where
    C: tokio::io::AsyncRead + Unpin + Send + 'static,
    K: LineSink,
{
    /// Forwards every line of the connection to the sink until end of
    /// stream, a read failure or shutdown. Ends with a `Closed` event unless
    /// shutdown finds the sink unable to take it.
    async fn handle_connection(&mut self) -> CloseReason {
        let accepted = ConnectionEvent::Accepted {
            connection_id: self.connection_id,
            peer: self.peer.clone(),
        };
        let reason = if self.deliver(accepted).await {
            self.read_loop().await
        } else {
            CloseReason::Shutdown
        };

        let closed = ConnectionEvent::Closed {
            connection_id: self.connection_id,
            peer: self.peer.clone(),
            reason: reason.clone(),
        };
        if !self.deliver(closed).await {
            debug!(
                "connection {} dropped its close event at shutdown",
                self.connection_id
            );
        }
        reason
    }

    /// Hands `event` to the sink unless shutdown comes first.
    ///
    /// A sink with room always wins, even after shutdown; a blocked sink
    /// gives up once shutdown is signalled. Returns `false` in that case.
    async fn deliver(&mut self, event: ConnectionEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.sink.deliver(event) => true,
            _ = self.shutdown.recv() => false,
        }
    }

    async fn read_loop(&mut self) -> CloseReason {
        loop {
            let maybe_line = tokio::select! {
                res = self.reader.read_line() => res,
                _ = self.shutdown.recv() => {
                    debug!("connection {} exit read loop after recv shutdown signal", self.connection_id);
                    return CloseReason::Shutdown;
                }
            };

            match maybe_line {
                Ok(Some(line)) => {
                    let event = ConnectionEvent::Line {
                        connection_id: self.connection_id,
                        line,
                    };
                    if !self.deliver(event).await {
                        debug!(
                            "connection {} exit while delivering after recv shutdown signal",
                            self.connection_id
                        );
                        return CloseReason::Shutdown;
                    }
                }
                // client closed the connection, trailing bytes already flushed
                Ok(None) => return CloseReason::EndOfStream,
                Err(e) => return CloseReason::Error(e.to_string()),
            }
        }
    }
}

/// Accepts connections and runs one line reader per connection.
#[derive(Debug)]
pub struct Server<L, K> {
    listener: L,
    limit_connections: Option<Arc<Semaphore>>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
    reader_config: ReaderConfig,
    sink: Arc<K>,
}

impl<L, K> Server<L, K>
where
    L: Accept,
    K: LineSink,
{
    /// `limit_connections` bounds the number of connections served at once;
    /// `None` accepts without limit.
    pub fn new(
        listener: L,
        limit_connections: Option<Arc<Semaphore>>,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
        reader_config: ReaderConfig,
        sink: Arc<K>,
    ) -> Self {
        Server {
            listener,
            limit_connections,
            notify_shutdown,
            shutdown_complete_tx,
            reader_config,
            sink,
        }
    }

    /// Accepts connections until the listener is closed or fails for good.
    ///
    /// Each connection gets a unique id and its own task, so a slow or broken
    /// client never holds up the loop or any other connection. When a
    /// connection limit is set, a permit is taken before accepting and given
    /// back when the connection's task ends.
    ///
    /// Graceful shutdown:
    /// 1. The caller drops the `run` future, which stops accepting.
    /// 2. The caller broadcasts on `notify_shutdown`; every handler stops at
    ///    its next read or blocked delivery and reports
    ///    `CloseReason::Shutdown`. Handlers subscribe here in `run`, before
    ///    their task is spawned, so none of them can miss the broadcast.
    /// 3. Each handler drops its `shutdown_complete_tx` clone on exit, so the
    ///    caller knows all connections are closed once the receiver yields
    ///    `None`.
    ///
    /// # Returns
    /// `Ok(())` once the listener reports it is closed, or
    /// `AppError::Accept` on a non-recoverable accept failure.
    pub async fn run(&self) -> AppResult<()> {
        self.reader_config.validate()?;

        loop {
            let permit = match &self.limit_connections {
                Some(limit) => Some(limit.clone().acquire_owned().await.map_err(|e| {
                    AppError::IllegalStateError(format!("connection limit closed: {}", e))
                })?),
                None => None,
            };

            let Some((socket, peer)) = self.accept().await? else {
                debug!("listener closed, stop accepting");
                return Ok(());
            };

            let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
            debug!("accept new connection {} from {}", connection_id, peer);

            let mut handler = ConnectionHandler {
                shutdown: Shutdown::new(self.notify_shutdown.subscribe()),
                _shutdown_complete_tx: self.shutdown_complete_tx.clone(),
                connection_id,
                peer,
                reader: StreamReader::new(socket, &self.reader_config)?,
                sink: self.sink.clone(),
            };

            tokio::spawn(async move {
                match handler.handle_connection().await {
                    CloseReason::Error(e) => {
                        error!("connection {} error: {}", handler.connection_id, e)
                    }
                    reason => debug!("connection {} closed: {:?}", handler.connection_id, reason),
                }
                // whether gracefully or unexpectedly closed, release connection
                drop(handler);
                drop(permit);
            });
        }
    }

    async fn accept(&self) -> AppResult<Option<(L::Conn, String)>> {
        let mut backoff = INITIAL_ACCEPT_BACKOFF;

        loop {
            match self.listener.accept().await {
                Ok(accepted) => return Ok(accepted),
                Err(err) if is_transient_accept_error(&err) => {
                    warn!("transient accept error, retry in {:?}: {}", backoff, err);
                }
                Err(err) => {
                    error!("accept failed: {}", err);
                    return Err(AppError::Accept(err.to_string()));
                }
            }

            time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
        }
    }
}

impl<L, K> Drop for Server<L, K> {
    fn drop(&mut self) {
        debug!("line server dropped");
    }
}

impl<C, K> Drop for ConnectionHandler<C, K> {
    fn drop(&mut self) {
        debug!("connection handler {} dropped", self.connection_id);
    }
}
