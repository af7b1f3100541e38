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

//! FIFO outbound queue with a single write in flight

use crate::{Connection, Result, SendHandler, ServiceError, lock, read_lock, write_lock};
use bytes::Bytes;
use metrics::counter;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};
use zard_codec::{Message, encode_message};

/// The write half a sender pushes bytes into.
pub type Writer = Box<dyn AsyncWrite + Send + Unpin + 'static>;

/// Outbound half of a transport.
///
/// Messages are written strictly in the order they were queued, one write at
/// a time. A failed write is reported to the send handler for that message
/// and the queue keeps draining.
#[derive(Clone)]
pub struct Sender {
    inner: Arc<SenderInner>,
}

struct SenderInner {
    connection: Arc<Connection>,
    queue: Mutex<VecDeque<Message>>,
    // Taken out for the duration of a write
    writer: Mutex<Option<Writer>>,
    closed: AtomicBool,
    last_action_id: AtomicU32,
    handler: RwLock<Option<SendHandler>>,
    total_bytes: AtomicU64,
}

impl Sender {
    /// Create a sender with no stream attached
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            inner: Arc::new(SenderInner {
                connection,
                queue: Mutex::new(VecDeque::new()),
                writer: Mutex::new(None),
                closed: AtomicBool::new(false),
                last_action_id: AtomicU32::new(0),
                handler: RwLock::new(None),
                total_bytes: AtomicU64::new(0),
            }),
        }
    }

    /// Attach the stream to write to.
    pub fn attach(&self, writer: impl AsyncWrite + Send + Unpin + 'static) {
        *lock(&self.inner.writer) = Some(Box::new(writer));
    }

    /// Register the send handler, replacing any previous one.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(std::result::Result<(), &ServiceError>, usize, &Message) + Send + Sync + 'static,
    {
        *write_lock(&self.inner.handler) = Some(Arc::new(handler));
    }

    /// Queue an action under a freshly allocated id and return that id.
    pub fn send_action(&self, contents: impl Into<Bytes>) -> u32 {
        let id = self.inner.next_action_id();
        self.send(Message::action(id, contents));
        id
    }

    /// Queue a reply to the action with the given id.
    pub fn send_reply(&self, id: u32, contents: impl Into<Bytes>) {
        self.send(Message::reply(id, contents));
    }

    /// Queue a prepared message.
    pub fn send(&self, message: Message) {
        let inner = self.inner.clone();
        self.inner.connection.execute(move || {
            let was_empty = {
                let mut queue = lock(&inner.queue);
                let was_empty = queue.is_empty();
                queue.push_back(message);
                was_empty
            };
            if was_empty {
                inner.dispatch();
            }
        });
    }

    /// Shut down the write direction once the write in flight, if any,
    /// completes. Messages still queued are reported as failed.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = self.inner.clone();
        self.inner.connection.execute(move || {
            let writer = lock(&inner.writer).take();
            if let Some(writer) = writer {
                inner.shutdown(writer);
            }
        });
    }

    /// Number of messages queued, including the one being written.
    pub fn queued(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Bytes written by completed sends.
    pub fn total_bytes_sent(&self) -> u64 {
        self.inner.total_bytes.load(Ordering::Relaxed)
    }

    /// The connection this sender writes for.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.connection
    }
}

impl SenderInner {
    /// Next non-zero action id; zero is skipped on wraparound.
    fn next_action_id(&self) -> u32 {
        loop {
            let id = self
                .last_action_id
                .fetch_add(1, Ordering::Relaxed)
                .wrapping_add(1);
            if id != 0 {
                return id;
            }
        }
    }

    fn handler(&self) -> Option<SendHandler> {
        read_lock(&self.handler).clone()
    }

    /// Start writing the front of the queue. Messages that fail before any
    /// I/O is issued are reported and popped in place.
    fn dispatch(self: Arc<Self>) {
        loop {
            let Some(message) = lock(&self.queue).front().cloned() else {
                return;
            };
            match self.prepare(&message) {
                Ok((wire, mut writer)) => {
                    let inner = self.clone();
                    let complete = self.connection.serializer().wrap(
                        move |(writer, message, result): (Writer, Message, Result<usize>)| {
                            inner.written(Some(writer), message, result)
                        },
                    );
                    self.connection.spawn(async move {
                        let result = write_frame(&mut writer, &wire).await;
                        complete((writer, message, result));
                    });
                    return;
                }
                Err(error) => {
                    if !self.report(None, message, Err(error)) {
                        return;
                    }
                }
            }
        }
    }

    fn prepare(&self, message: &Message) -> Result<(Bytes, Writer)> {
        let wire = encode_message(self.connection.protocol(), message)?;
        let writer = lock(&self.writer).take();
        match writer {
            Some(writer) => Ok((wire, writer)),
            None if self.closed.load(Ordering::Acquire) => Err(ServiceError::ConnectionClosed),
            None => Err(ServiceError::NotConnected),
        }
    }

    fn written(self: Arc<Self>, writer: Option<Writer>, message: Message, result: Result<usize>) {
        if self.report(writer, message, result) {
            self.dispatch();
        }
    }

    /// Return the writer, notify the handler and pop the front message.
    /// Returns whether more messages are waiting.
    fn report(&self, writer: Option<Writer>, message: Message, result: Result<usize>) -> bool {
        if let Some(writer) = writer {
            if self.closed.load(Ordering::Acquire) {
                self.shutdown(writer);
            } else {
                *lock(&self.writer) = Some(writer);
            }
        }

        let bytes = match &result {
            Ok(bytes) => {
                self.total_bytes.fetch_add(*bytes as u64, Ordering::Relaxed);
                counter!("zard.messages.sent").increment(1);
                counter!("zard.bytes.sent").increment(*bytes as u64);
                trace!(
                    connection = %self.connection.id(),
                    message_id = message.id(),
                    bytes,
                    "Message sent"
                );
                *bytes
            }
            Err(error) => {
                counter!("zard.errors.send").increment(1);
                warn!(
                    connection = %self.connection.id(),
                    message_id = message.id(),
                    "Send failed: {}",
                    error
                );
                0
            }
        };

        if let Some(handler) = self.handler() {
            handler(result.as_ref().map(|_| ()), bytes, &message);
        }

        let mut queue = lock(&self.queue);
        queue.pop_front();
        !queue.is_empty()
    }

    fn shutdown(&self, mut writer: Writer) {
        let id = self.connection.id();
        self.connection.spawn(async move {
            if let Err(error) = writer.shutdown().await {
                debug!(connection = %id, "Shutdown of write half failed: {}", error);
            }
        });
    }
}

async fn write_frame(writer: &mut Writer, wire: &[u8]) -> Result<usize> {
    writer.write_all(wire).await?;
    writer.flush().await?;
    Ok(wire.len())
}
