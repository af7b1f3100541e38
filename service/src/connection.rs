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

//! State shared by every capability of one transport

use crate::{ConnectionId, Serializer, read_lock, write_lock};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zard_codec::Protocol;

/// Largest inbound frame accepted by default, in bytes.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Shared connection state.
///
/// Holds the current wire protocol, the serializer binding, the runtime that
/// asynchronous operations are spawned on and the cancellation token that
/// aborts pending reads, accepts and connects when the connection closes.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    handle: Handle,
    protocol: AtomicU8,
    max_frame_length: AtomicUsize,
    serializer: Serializer,
    cancel: CancellationToken,
    peer_addr: RwLock<Option<SocketAddr>>,
}

impl Connection {
    /// Create a connection speaking the default protocol with a disabled
    /// serializer.
    pub fn new(handle: Handle) -> Self {
        Self {
            id: ConnectionId::next(),
            handle,
            protocol: AtomicU8::new(Protocol::default().as_u8()),
            max_frame_length: AtomicUsize::new(DEFAULT_MAX_FRAME_LENGTH),
            serializer: Serializer::new(),
            cancel: CancellationToken::new(),
            peer_addr: RwLock::new(None),
        }
    }

    /// Set the initial protocol
    pub fn with_protocol(self, protocol: Protocol) -> Self {
        self.protocol.store(protocol.as_u8(), Ordering::Release);
        self
    }

    /// Set the largest inbound frame, in bytes
    pub fn with_max_frame_length(self, max: usize) -> Self {
        self.max_frame_length.store(max, Ordering::Release);
        self
    }

    /// Bind the connection to a serializer
    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Close this connection whenever `parent` is cancelled
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Process-unique connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The runtime asynchronous operations are spawned on.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// The protocol applied to the next frame read or written.
    pub fn protocol(&self) -> Protocol {
        Protocol::from_u8(self.protocol.load(Ordering::Acquire))
    }

    /// Switch protocols. Reads already armed keep the protocol they started with.
    pub fn set_protocol(&self, protocol: Protocol) {
        let previous = Protocol::from_u8(self.protocol.swap(protocol.as_u8(), Ordering::AcqRel));
        if previous != protocol {
            debug!(connection = %self.id, from = %previous, to = %protocol, "Protocol changed");
        }
    }

    /// Largest inbound frame, in bytes. A peer announcing or sending more
    /// ends its read loop with a framing error.
    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length.load(Ordering::Acquire)
    }

    /// The serializer binding every completion of this connection runs under.
    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    /// Run `f` under this connection's exclusion guarantee.
    pub fn execute(&self, f: impl FnOnce() + Send + 'static) {
        self.serializer.execute(f);
    }

    /// Token cancelled by [`Connection::close`] or by the parent token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Check if the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Abort every pending read, accept and connect on this connection.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(connection = %self.id, "Closing connection");
            self.cancel.cancel();
        }
    }

    /// Address of the peer once accepted or connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *read_lock(&self.peer_addr)
    }

    pub(crate) fn set_peer_addr(&self, addr: Option<SocketAddr>) {
        *write_lock(&self.peer_addr) = addr;
    }

    /// Spawn an asynchronous operation on the connection's runtime.
    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}
