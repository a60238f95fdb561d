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

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::{runtime, signal};
use tracing::{error, info, trace};

use crate::service::{Server, StdoutSink};
use crate::AppError::IllegalStateError;
use crate::{global_config, AppResult};

/// Process-level wiring: bind, serve until ctrl-c, then wait for every
/// connection to close.
#[derive(Debug, Default)]
pub struct LineService;

impl LineService {
    pub fn new() -> Self {
        LineService
    }

    pub fn start(&self, rt: &runtime::Runtime) -> AppResult<()> {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);

        rt.block_on(Self::run_tcp_server(
            notify_shutdown.clone(),
            shutdown_complete_tx,
        ))?;

        // tcp server has been shutdown, tell the connection handlers
        if notify_shutdown.send(()).is_err() {
            trace!("no connection is alive at shutdown");
        }
        // wait for shutdown complete
        trace!("waiting for shutdown complete...");
        rt.block_on(shutdown_complete_rx.recv());
        info!("line service shutdown complete");
        Ok(())
    }

    async fn run_tcp_server(
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> AppResult<()> {
        let config = global_config();
        let listen_address = config.listen_address();

        let listener = match TcpListener::bind(&listen_address).await {
            Ok(listener) => listener,
            Err(err) => {
                let error_msg = format!(
                    "Failed to bind server to address: {} - Error: {}",
                    listen_address, err
                );
                error!("{}", error_msg);
                return Err(IllegalStateError(error_msg));
            }
        };
        info!("tcp server binding to {} for listening", &listen_address);

        let max_connection = config.network.max_connection;
        let limit_connections = (max_connection > 0).then(|| Arc::new(Semaphore::new(max_connection)));

        let server = Server::new(
            listener,
            limit_connections,
            notify_shutdown,
            shutdown_complete_tx,
            config.reader.clone(),
            Arc::new(StdoutSink::new()),
        );
        tokio::select! {
          res = server.run() => {
              if let Err(err) = res {
                  error!(cause = %err, "failed to accept");
              }
          }
          _ = signal::ctrl_c() => {
              info!("get shutdown signal");
          }
        }

        Ok(())
    }
}
