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

use std::io::{ErrorKind, Read};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::time;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::network::{LineCodec, LineRecord};
use crate::{AppError, AppResult, ReaderConfig};

fn codec_from_config(config: &ReaderConfig) -> AppResult<LineCodec> {
    let delimiter = config.delimiter()?;
    Ok(match config.max_line_length() {
        Some(max) => LineCodec::with_max_length(delimiter, max),
        None => LineCodec::new(delimiter),
    })
}

fn chunk_buffer(chunk_size: usize) -> AppResult<Vec<u8>> {
    if chunk_size == 0 {
        return Err(AppError::InvalidValue(
            "chunk size must be at least 1".to_string(),
        ));
    }
    Ok(vec![0; chunk_size])
}

/// Reads delimiter-terminated lines from an async byte source.
///
/// Bytes are pulled in chunks of at most `chunk_size` and appended to the
/// accumulator; every complete line is handed out before the next read.
/// The sequence ends on end of stream, after flushing any trailing bytes as
/// a last line, or on the first error. It cannot be restarted.
///
/// The reader owns `source`. Pass `&mut source` to keep ownership and close
/// the source yourself.
#[derive(Debug)]
pub struct StreamReader<S> {
    source: S,
    codec: LineCodec,
    buffer: BytesMut,
    chunk: Vec<u8>,
    read_timeout: Option<Duration>,
    stream_capacity: usize,
    eof: bool,
    finished: bool,
}

impl<S> StreamReader<S>
where
    S: AsyncRead + Unpin,
{
    pub fn new(source: S, config: &ReaderConfig) -> AppResult<StreamReader<S>> {
        let mut reader =
            StreamReader::with_codec(source, codec_from_config(config)?, config.chunk_size)?;
        reader.read_timeout = config.read_timeout();
        reader.stream_capacity = config.channel_capacity;
        Ok(reader)
    }

    pub fn with_codec(source: S, codec: LineCodec, chunk_size: usize) -> AppResult<StreamReader<S>> {
        Ok(StreamReader {
            source,
            codec,
            buffer: BytesMut::with_capacity(4 * 1024),
            chunk: chunk_buffer(chunk_size)?,
            read_timeout: None,
            stream_capacity: ReaderConfig::default().channel_capacity,
            eof: false,
            finished: false,
        })
    }

    /// Fails a read that produces nothing within `timeout`.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Number of lines `into_line_stream` buffers ahead of the consumer.
    pub fn stream_capacity(&self) -> usize {
        self.stream_capacity
    }

    /// Returns the next line, or `None` once the sequence is exhausted.
    ///
    /// An error is returned once and ends the sequence; later calls return
    /// `None`.
    pub async fn read_line(&mut self) -> AppResult<Option<LineRecord>> {
        if self.finished {
            return Ok(None);
        }
        let result = self.next_line().await;
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    async fn next_line(&mut self) -> AppResult<Option<LineRecord>> {
        loop {
            if let Some(line) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(line));
            }
            if self.eof {
                return self.codec.decode_eof(&mut self.buffer);
            }
            if 0 == self.read_chunk().await? {
                trace!(residual = self.buffer.len(), "byte source reached end of stream");
                self.eof = true;
            }
        }
    }

    async fn read_chunk(&mut self) -> AppResult<usize> {
        loop {
            let read = match self.read_timeout {
                Some(timeout) => time::timeout(timeout, self.source.read(&mut self.chunk))
                    .await
                    .map_err(|_| AppError::ReadTimeout(timeout))?,
                None => self.source.read(&mut self.chunk).await,
            };
            match read {
                Ok(n) => {
                    self.buffer.extend_from_slice(&self.chunk[..n]);
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S> StreamReader<S>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    /// Moves the reader onto its own task and exposes its lines as a stream.
    ///
    /// The stream ends when the channel closes: after the last line, or right
    /// after an error item. Dropping the stream stops the task at its next
    /// send. At most `stream_capacity` lines are read ahead of the consumer.
    pub fn into_line_stream(mut self) -> ReceiverStream<AppResult<LineRecord>> {
        let (tx, rx) = mpsc::channel(self.stream_capacity.max(1));
        tokio::spawn(async move {
            loop {
                let item = match self.read_line().await {
                    Ok(Some(line)) => Ok(line),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let is_err = item.is_err();
                if tx.send(item).await.is_err() {
                    trace!("line stream dropped by consumer");
                    break;
                }
                if is_err {
                    break;
                }
            }
        });
        ReceiverStream::new(rx)
    }
}

/// Blocking counterpart of [`StreamReader`] over `std::io::Read`.
#[derive(Debug)]
pub struct BlockingLines<R> {
    source: R,
    codec: LineCodec,
    buffer: BytesMut,
    chunk: Vec<u8>,
    finished: bool,
}

impl<R: Read> BlockingLines<R> {
    pub fn new(source: R, config: &ReaderConfig) -> AppResult<BlockingLines<R>> {
        BlockingLines::with_codec(source, codec_from_config(config)?, config.chunk_size)
    }

    pub fn with_codec(source: R, codec: LineCodec, chunk_size: usize) -> AppResult<BlockingLines<R>> {
        Ok(BlockingLines {
            source,
            codec,
            buffer: BytesMut::with_capacity(4 * 1024),
            chunk: chunk_buffer(chunk_size)?,
            finished: false,
        })
    }

    fn next_line(&mut self) -> AppResult<Option<LineRecord>> {
        loop {
            if let Some(line) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(line));
            }
            let n = match self.source.read(&mut self.chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                let last = self.codec.decode_eof(&mut self.buffer)?;
                // trailing bytes were flushed, the sequence ends here
                self.finished = true;
                return Ok(last);
            }
            self.buffer.extend_from_slice(&self.chunk[..n]);
        }
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R: Read> Iterator for BlockingLines<R> {
    type Item = AppResult<LineRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
