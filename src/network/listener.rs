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
use std::io;

use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};

/// A listening endpoint that hands out connections.
///
/// `Ok(None)` means the endpoint has been closed and no further connection
/// will ever arrive. A connection is closed by dropping it.
pub trait Accept: Send + Sync + 'static {
    type Conn: AsyncRead + Unpin + Send + 'static;

    /// Waits for the next connection together with a printable peer address.
    fn accept(&self) -> impl Future<Output = io::Result<Option<(Self::Conn, String)>>> + Send;
}

impl Accept for TcpListener {
    type Conn = TcpStream;

    async fn accept(&self) -> io::Result<Option<(TcpStream, String)>> {
        let (socket, peer) = TcpListener::accept(self).await?;
        Ok(Some((socket, peer.to_string())))
    }
}
