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

//! Client sessions
//!
//! A session binds one transport to an identity, a lifecycle status and an
//! opaque mode owned by the command layer. It installs glue callbacks on the
//! transport that update the status before forwarding events to the
//! registered [`SessionHandler`]:
//!
//! ```text
//! wait_for_connection ──accept ok──> connected ──receive error──> disconnected
//!          │                            │                              │
//!          └──accept error──┐           └──send error──┐   send error──┘
//!                           v                          v
//!                        reapable <────────────────────┘
//! ```
//!
//! Only the first failure of a session reaches [`SessionHandler::on_error`].
//! Closing after a send error cancels the pending read, and that read's
//! `ConnectionClosed` is not forwarded again.

use crate::{
    Result, ServiceError, SessionHandler, SessionId, SessionStatus, Transport, read_lock,
    write_lock,
};
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use tokio::net::TcpListener;
use tracing::{debug, error, info, trace};
use zard_codec::{Message, Protocol};

/// One client session.
pub struct Session<M> {
    id: SessionId,
    transport: Box<dyn Transport>,
    status: AtomicU8,
    failed: AtomicBool,
    identity: OnceLock<String>,
    mode: RwLock<M>,
    handler: RwLock<Option<Arc<dyn SessionHandler<M>>>>,
}

impl<M> Session<M>
where
    M: Clone + Default + Send + Sync + 'static,
{
    /// Create a session over `transport` and install its glue callbacks.
    pub fn new(id: SessionId, transport: impl Transport) -> Arc<Self> {
        let session = Arc::new(Self {
            id,
            transport: Box::new(transport),
            status: AtomicU8::new(SessionStatus::WaitForConnection.as_u8()),
            failed: AtomicBool::new(false),
            identity: OnceLock::new(),
            mode: RwLock::new(M::default()),
            handler: RwLock::new(None),
        });

        let weak = Arc::downgrade(&session);
        if let Some(acceptor) = session.transport.acceptor() {
            let weak = weak.clone();
            acceptor.set_handler(move |result| {
                if let Some(session) = weak.upgrade() {
                    session.accepted(result);
                }
            });
        }
        {
            let weak = weak.clone();
            session.transport.receiver().set_handler(move |result, bytes| {
                if let Some(session) = weak.upgrade() {
                    session.received(result, bytes);
                }
            });
        }
        session
            .transport
            .sender()
            .set_handler(move |result, bytes, message| {
                if let Some(session) = weak.upgrade() {
                    session.sent(result, bytes, message);
                }
            });

        session
    }

    /// Register the handler events are forwarded to.
    pub fn set_handler(&self, handler: Arc<dyn SessionHandler<M>>) {
        *write_lock(&self.handler) = Some(handler);
    }

    /// Wait for a peer on `listener`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotImplemented`] if the transport cannot accept.
    pub fn accept(&self, listener: Arc<TcpListener>) -> Result<()> {
        match self.transport.acceptor() {
            Some(acceptor) => {
                acceptor.accept(listener);
                Ok(())
            }
            None => Err(ServiceError::NotImplemented(
                "accept on a transport without an acceptor".to_string(),
            )),
        }
    }

    /// Send `contents` as an action and return its id.
    pub fn send(&self, contents: impl Into<Bytes>) -> u32 {
        self.transport.sender().send_action(contents)
    }

    /// Send `contents` as the reply to action `id`.
    pub fn send_reply(&self, id: u32, contents: impl Into<Bytes>) {
        self.transport.sender().send_reply(id, contents);
    }

    /// Start the receive loop.
    pub fn receive(&self) -> Result<()> {
        self.transport.receiver().receive()
    }

    /// Set the login identity.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Busy`] if an identity was already set.
    pub fn set_identity(&self, identity: impl Into<String>) -> Result<()> {
        self.identity.set(identity.into()).map_err(|rejected| {
            ServiceError::Busy(format!(
                "{} is already logged in, cannot log in as `{}`",
                self.id, rejected
            ))
        })
    }

    /// Apply a status transition. Status only moves forward; returns whether
    /// the status changed.
    pub fn set_status(&self, status: SessionStatus) -> bool {
        let changed = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (status.as_u8() > current).then_some(status.as_u8())
            })
            .is_ok();
        if changed {
            debug!(session = %self.id, %status, "Session status changed");
        }
        changed
    }

    /// The opaque command layer mode.
    pub fn mode(&self) -> M {
        read_lock(&self.mode).clone()
    }

    /// Replace the command layer mode.
    pub fn set_mode(&self, mode: M) {
        *write_lock(&self.mode) = mode;
    }

    fn handler(&self) -> Option<Arc<dyn SessionHandler<M>>> {
        read_lock(&self.handler).clone()
    }

    fn report(self: &Arc<Self>, error: &ServiceError) {
        if self.failed.swap(true, Ordering::AcqRel) {
            trace!(session = %self.id, "Suppressed follow-up error: {}", error);
            return;
        }
        if let Some(handler) = self.handler() {
            handler.on_error(self, error);
        }
    }

    fn accepted(self: Arc<Self>, result: std::result::Result<(), &ServiceError>) {
        match result {
            Ok(()) => {
                self.set_status(SessionStatus::Connected);
                if let Some(handler) = self.handler() {
                    handler.on_accept(&self);
                }
            }
            Err(error) => {
                self.set_status(SessionStatus::Reapable);
                self.report(error);
            }
        }
    }

    fn received(self: Arc<Self>, result: std::result::Result<&Message, &ServiceError>, bytes: usize) {
        match result {
            Ok(message) => {
                trace!(session = %self.id, message_id = message.id(), bytes, "Session received message");
                if let Some(handler) = self.handler() {
                    handler.on_message(&self, message);
                }
            }
            Err(error) => {
                if error.is_eof() {
                    info!(session = %self.id, "Client disconnected");
                } else if matches!(error, ServiceError::ConnectionClosed) {
                    debug!(session = %self.id, "Session closed");
                } else {
                    error!(
                        session = %self.id,
                        "Error while receiving data, connection closed: {}",
                        error
                    );
                }
                self.set_status(SessionStatus::Disconnected);
                self.report(error);
            }
        }
    }

    fn sent(
        self: Arc<Self>,
        result: std::result::Result<(), &ServiceError>,
        bytes: usize,
        message: &Message,
    ) {
        match result {
            Ok(()) => trace!(session = %self.id, message_id = message.id(), bytes, "Session sent message"),
            Err(error) => {
                self.transport.close();
                self.set_status(SessionStatus::Reapable);
                self.report(error);
            }
        }
    }
}

impl<M> Session<M> {
    /// Registry key.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// The login identity, `None` before login.
    pub fn identity(&self) -> Option<&str> {
        self.identity.get().map(String::as_str)
    }

    /// The transport this session drives.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Protocol of the underlying connection.
    pub fn protocol(&self) -> Protocol {
        self.transport.protocol()
    }

    /// Switch the wire protocol, effective from the next frame.
    pub fn set_protocol(&self, protocol: Protocol) {
        self.transport.set_protocol(protocol);
    }

    /// Address of the peer, once connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.connection().peer_addr()
    }

    /// Abort the receive loop and shut down the write direction.
    pub fn close(&self) {
        self.transport.close();
    }
}

impl<M> Drop for Session<M> {
    fn drop(&mut self) {
        self.transport.close();
    }
}

impl<M> fmt::Debug for Session<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("identity", &self.identity())
            .finish()
    }
}
