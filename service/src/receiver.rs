//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Continuous inbound read loop
//!
//! A [`Receiver`] keeps exactly one read in flight. Framing depends on the
//! connection's protocol at the moment the read is armed:
//!
//! ```text
//! line / telnet  read until the delimiter, delimiter kept in the frame
//! basic          read 4 byte length, then exactly that many bytes
//! direct         not implemented, reported to the handler
//! compressed     not implemented, reported to the handler
//! ```
//!
//! Each successful read is decoded and handed to the receive handler, after
//! which the next read is armed immediately. The first error ends the loop.

use crate::{Connection, ReceiveHandler, Result, ServiceError, lock, read_lock, write_lock};
use bytes::{Buf, Bytes, BytesMut};
use metrics::counter;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace, warn};
use zard_codec::{
    CodecError, LENGTH_PREFIX_LEN, Message, Protocol, decode_frame, find_delimiter,
    read_length_prefix,
};

/// The read half a receiver pulls bytes from.
pub type Reader = Box<dyn AsyncRead + Send + Unpin + 'static>;

const READ_CHUNK: usize = 4096;

/// Inbound half of a transport.
///
/// Cloning yields another handle to the same read loop.
#[derive(Clone)]
pub struct Receiver {
    inner: Arc<ReceiverInner>,
}

struct ReceiverInner {
    connection: Arc<Connection>,
    // Taken out for the duration of a read
    state: Mutex<Option<ReadState>>,
    handler: RwLock<Option<ReceiveHandler>>,
    armed: AtomicBool,
    total_bytes: AtomicU64,
}

struct ReadState {
    reader: Reader,
    buffer: BytesMut,
}

impl Receiver {
    /// Create a receiver with no stream attached
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            inner: Arc::new(ReceiverInner {
                connection,
                state: Mutex::new(None),
                handler: RwLock::new(None),
                armed: AtomicBool::new(false),
                total_bytes: AtomicU64::new(0),
            }),
        }
    }

    /// Attach the stream to read from, discarding any buffered bytes.
    pub fn attach(&self, reader: impl AsyncRead + Send + Unpin + 'static) {
        *lock(&self.inner.state) = Some(ReadState {
            reader: Box::new(reader),
            buffer: BytesMut::with_capacity(READ_CHUNK),
        });
    }

    /// Register the receive handler, replacing any previous one.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(std::result::Result<&Message, &ServiceError>, usize) + Send + Sync + 'static,
    {
        *write_lock(&self.inner.handler) = Some(Arc::new(handler));
    }

    /// Start the read loop.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Busy`] if a read is already in flight on this
    /// connection.
    pub fn receive(&self) -> Result<()> {
        if self.inner.armed.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::Busy(format!(
                "a receive is already in progress on {}",
                self.inner.connection.id()
            )));
        }
        let inner = self.inner.clone();
        self.inner.connection.execute(move || inner.start_read());
        Ok(())
    }

    /// Check if the read loop is running.
    pub fn is_receiving(&self) -> bool {
        self.inner.armed.load(Ordering::Acquire)
    }

    /// Bytes consumed by delivered messages.
    pub fn total_bytes_received(&self) -> u64 {
        self.inner.total_bytes.load(Ordering::Relaxed)
    }

    /// The connection this receiver reads for.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.connection
    }
}

impl ReceiverInner {
    fn handler(&self) -> Option<ReceiveHandler> {
        read_lock(&self.handler).clone()
    }

    fn start_read(self: Arc<Self>) {
        let protocol = self.connection.protocol();
        let max = self.connection.max_frame_length();
        let Some(mut state) = lock(&self.state).take() else {
            self.finish(ServiceError::NotConnected, 0);
            return;
        };
        trace!(connection = %self.connection.id(), %protocol, "Read armed");

        let cancel = self.connection.cancel_token().clone();
        let inner = self.clone();
        let complete = self.connection.serializer().wrap(
            move |(state, outcome): (ReadState, Result<(Bytes, usize)>)| {
                inner.complete(state, protocol, outcome)
            },
        );
        self.connection.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ServiceError::ConnectionClosed),
                result = state.read_frame(protocol, max) => result,
            };
            complete((state, outcome));
        });
    }

    fn complete(
        self: Arc<Self>,
        state: ReadState,
        protocol: Protocol,
        outcome: Result<(Bytes, usize)>,
    ) {
        let partial = state.buffer.len();
        *lock(&self.state) = Some(state);
        match outcome {
            Ok((frame, bytes)) => match decode_frame(protocol, frame) {
                Ok(message) => self.deliver(message, bytes),
                Err(error) => self.finish(error.into(), bytes),
            },
            Err(error) => self.finish(error, partial),
        }
    }

    fn deliver(self: Arc<Self>, message: Message, bytes: usize) {
        self.total_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        counter!("zard.messages.received").increment(1);
        counter!("zard.bytes.received").increment(bytes as u64);
        trace!(
            connection = %self.connection.id(),
            message_id = message.id(),
            bytes,
            "Message received"
        );
        if let Some(handler) = self.handler() {
            handler(Ok(&message), bytes);
        }
        self.start_read();
    }

    fn finish(self: Arc<Self>, error: ServiceError, bytes: usize) {
        self.armed.store(false, Ordering::Release);
        counter!("zard.errors.receive").increment(1);
        if error.is_eof() || matches!(error, ServiceError::ConnectionClosed) {
            debug!(connection = %self.connection.id(), bytes, "Receive loop ended: {}", error);
        } else {
            warn!(connection = %self.connection.id(), bytes, "Receive failed: {}", error);
        }
        if let Some(handler) = self.handler() {
            handler(Err(&error), bytes);
        }
    }
}

impl ReadState {
    /// Read one raw frame of at most `max` bytes. Returns the frame and the
    /// number of bytes it occupied on the wire.
    async fn read_frame(&mut self, protocol: Protocol, max: usize) -> Result<(Bytes, usize)> {
        match protocol {
            Protocol::Line | Protocol::Telnet => {
                let delimiter = protocol.delimiter().unwrap_or_default();
                let mut searched = 0;
                loop {
                    if let Some(offset) = find_delimiter(&self.buffer[searched..], delimiter) {
                        let end = searched + offset + delimiter.len();
                        let length = end - delimiter.len();
                        if length > max {
                            return Err(CodecError::FrameTooLarge { length, max }.into());
                        }
                        return Ok((self.buffer.split_to(end).freeze(), end));
                    }
                    if self.buffer.len() > max {
                        return Err(CodecError::FrameTooLarge {
                            length: self.buffer.len(),
                            max,
                        }
                        .into());
                    }
                    // A partial delimiter may straddle the end of the buffer
                    searched = self.buffer.len().saturating_sub(delimiter.len() - 1);
                    self.fill().await?;
                }
            }
            Protocol::Basic => {
                self.fill_to(LENGTH_PREFIX_LEN).await?;
                let length =
                    read_length_prefix([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]])
                        as usize;
                if length > max {
                    return Err(CodecError::FrameTooLarge { length, max }.into());
                }
                self.fill_to(LENGTH_PREFIX_LEN + length).await?;
                self.buffer.advance(LENGTH_PREFIX_LEN);
                Ok((self.buffer.split_to(length).freeze(), LENGTH_PREFIX_LEN + length))
            }
            Protocol::Direct | Protocol::Compressed => Err(ServiceError::NotImplemented(format!(
                "receiving with the `{protocol}` protocol"
            ))),
        }
    }

    async fn fill(&mut self) -> Result<usize> {
        self.buffer.reserve(READ_CHUNK);
        match self.reader.read_buf(&mut self.buffer).await? {
            0 => Err(ServiceError::eof()),
            read => Ok(read),
        }
    }

    /// Grows the buffer only as bytes arrive.
    async fn fill_to(&mut self, length: usize) -> Result<()> {
        while self.buffer.len() < length {
            self.fill().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_MAX_FRAME_LENGTH;
    use tokio::io::AsyncWriteExt;
    use tokio::runtime::Handle;
    use tokio::sync::mpsc;

    type Event = std::result::Result<Message, String>;

    fn receiver_with_channel(protocol: Protocol) -> (Receiver, mpsc::UnboundedReceiver<Event>) {
        receiver_for(Connection::new(Handle::current()).with_protocol(protocol))
    }

    fn receiver_for(connection: Connection) -> (Receiver, mpsc::UnboundedReceiver<Event>) {
        let receiver = Receiver::new(Arc::new(connection));
        let (tx, rx) = mpsc::unbounded_channel();
        receiver.set_handler(move |result, _bytes| {
            let event = result.map(Message::clone).map_err(ToString::to_string);
            let _ = tx.send(event);
        });
        (receiver, rx)
    }

    #[tokio::test]
    async fn test_telnet_frames_split_across_reads() {
        let (receiver, mut events) = receiver_with_channel(Protocol::Telnet);
        let (mut client, server) = tokio::io::duplex(64);
        receiver.attach(server);
        receiver.receive().unwrap();

        client.write_all(b"user al").await.unwrap();
        client.write_all(b"ice\r").await.unwrap();
        client.write_all(b"\ngame list\r\n").await.unwrap();

        let first = events.recv().await.unwrap().unwrap();
        let second = events.recv().await.unwrap().unwrap();
        assert_eq!(first, Message::reply(0, "user alice"));
        assert_eq!(second, Message::reply(0, "game list"));
        assert_eq!(receiver.total_bytes_received(), 23);
    }

    #[tokio::test]
    async fn test_basic_two_phase_read() {
        let (receiver, mut events) = receiver_with_channel(Protocol::Basic);
        let (mut client, server) = tokio::io::duplex(64);
        receiver.attach(server);
        receiver.receive().unwrap();

        client.write_all(b"\x00\x00\x00\x07").await.unwrap();
        client.write_all(b"R\x00\x00\x00\x09OK").await.unwrap();

        let message = events.recv().await.unwrap().unwrap();
        assert_eq!(message, Message::reply(9, "OK"));
    }

    #[tokio::test]
    async fn test_short_basic_frame_ends_loop() {
        let (receiver, mut events) = receiver_with_channel(Protocol::Basic);
        let (mut client, server) = tokio::io::duplex(64);
        receiver.attach(server);
        receiver.receive().unwrap();

        client.write_all(b"\x00\x00\x00\x02R\x00").await.unwrap();

        let error = events.recv().await.unwrap().unwrap_err();
        assert!(error.starts_with("Protocol error"));
        assert!(!receiver.is_receiving());
    }

    #[tokio::test]
    async fn test_oversized_basic_length_ends_loop() {
        let (receiver, mut events) = receiver_with_channel(Protocol::Basic);
        let (mut client, server) = tokio::io::duplex(64);
        receiver.attach(server);
        receiver.receive().unwrap();

        client.write_all(b"\xFF\xFF\xFF\xFFA").await.unwrap();

        let error = events.recv().await.unwrap().unwrap_err();
        assert_eq!(
            error,
            format!(
                "Protocol error: frame of {} bytes exceeds the maximum of {} bytes",
                u32::MAX,
                DEFAULT_MAX_FRAME_LENGTH
            )
        );
        assert!(!receiver.is_receiving());
    }

    #[tokio::test]
    async fn test_basic_frame_at_the_limit() {
        let connection = Connection::new(Handle::current())
            .with_protocol(Protocol::Basic)
            .with_max_frame_length(7);
        let (receiver, mut events) = receiver_for(connection);
        let (mut client, server) = tokio::io::duplex(64);
        receiver.attach(server);
        receiver.receive().unwrap();

        client.write_all(b"\x00\x00\x00\x07R\x00\x00\x00\x01OK").await.unwrap();
        assert_eq!(events.recv().await.unwrap().unwrap(), Message::reply(1, "OK"));

        client.write_all(b"\x00\x00\x00\x08R\x00\x00\x00\x02OK!").await.unwrap();
        assert!(events.recv().await.unwrap().unwrap_err().contains("exceeds the maximum of 7"));
    }

    #[tokio::test]
    async fn test_unterminated_line_longer_than_limit_ends_loop() {
        let connection = Connection::new(Handle::current())
            .with_protocol(Protocol::Line)
            .with_max_frame_length(16);
        let (receiver, mut events) = receiver_for(connection);
        let (mut client, server) = tokio::io::duplex(64);
        receiver.attach(server);
        receiver.receive().unwrap();

        client.write_all(b"short\n").await.unwrap();
        assert_eq!(events.recv().await.unwrap().unwrap(), Message::reply(0, "short"));

        client.write_all(&[b'x'; 32]).await.unwrap();
        let error = events.recv().await.unwrap().unwrap_err();
        assert!(error.contains("exceeds the maximum of 16"));
        assert!(!receiver.is_receiving());
    }

    #[tokio::test]
    async fn test_second_receive_is_busy() {
        let (receiver, _events) = receiver_with_channel(Protocol::Line);
        let (_client, server) = tokio::io::duplex(64);
        receiver.attach(server);
        receiver.receive().unwrap();
        assert!(receiver.receive().unwrap_err().is_busy());
    }

    #[tokio::test]
    async fn test_receive_without_stream() {
        let (receiver, mut events) = receiver_with_channel(Protocol::Line);
        receiver.receive().unwrap();
        assert_eq!(events.recv().await.unwrap().unwrap_err(), "Not connected");
    }

    #[tokio::test]
    async fn test_direct_receive_not_implemented() {
        let (receiver, mut events) = receiver_with_channel(Protocol::Direct);
        let (_client, server) = tokio::io::duplex(64);
        receiver.attach(server);
        receiver.receive().unwrap();
        let error = events.recv().await.unwrap().unwrap_err();
        assert!(error.starts_with("Not implemented"));
    }

    #[tokio::test]
    async fn test_close_aborts_pending_read() {
        let (receiver, mut events) = receiver_with_channel(Protocol::Line);
        let (_client, server) = tokio::io::duplex(64);
        receiver.attach(server);
        receiver.receive().unwrap();
        receiver.connection().close();
        assert_eq!(events.recv().await.unwrap().unwrap_err(), "Connection closed");
    }
}
