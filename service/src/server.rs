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

//! Session server
//!
//! The SessionServer owns the listening socket and the session registry.
//! It keeps exactly one pending session armed on the listener; when that
//! session accepts a peer it is registered, greeted and started, and the
//! next pending session is armed.

use crate::{
    Connection, Result, Serializer, ServerConfig, ServiceError, Session, SessionHandler,
    SessionId, SessionReaper, SessionRegistry, SessionStatus, TcpTransport, lock,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use zard_codec::Message;

/// Delay before re-arming the listener after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Session server
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use zard_codec::Message;
/// use zard_service::{ServerConfig, Session, SessionHandler, SessionServer};
///
/// struct Echo;
///
/// impl SessionHandler<()> for Echo {
///     fn on_message(&self, session: &Arc<Session<()>>, message: &Message) {
///         session.send(message.contents().clone());
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::default().validate()?;
///     let server = SessionServer::bind(config, Arc::new(Echo)).await?;
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct SessionServer<M> {
    /// Server configuration
    config: ServerConfig,
    /// Runtime sessions and the reaper run on
    handle: Handle,
    /// Listening socket shared with every pending accept
    listener: Arc<TcpListener>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Live sessions
    registry: Arc<SessionRegistry<M>>,
    /// Command layer
    handler: Arc<dyn SessionHandler<M>>,
    /// Session armed on the listener
    pending: Mutex<Option<Arc<Session<M>>>>,
    /// Next session key
    next_session: AtomicU64,
    /// Running flag
    running: AtomicBool,
    /// Cancelled on shutdown; parent of every session's token
    shutdown: CancellationToken,
    /// Reaper task handle
    reaper: Mutex<Option<JoinHandle<()>>>,
    /// Server start time
    started_at: Instant,
}

impl<M> SessionServer<M>
where
    M: Clone + Default + Send + Sync + 'static,
{
    /// Bind the listener. Call [`start`](Self::start) or [`run`](Self::run)
    /// to begin accepting sessions.
    pub async fn bind(config: ServerConfig, handler: Arc<dyn SessionHandler<M>>) -> Result<Arc<Self>> {
        Self::bind_with_registry(config, Arc::new(SessionRegistry::new()), handler).await
    }

    /// Bind the listener, registering sessions in a registry shared with the
    /// command layer.
    pub async fn bind_with_registry(
        config: ServerConfig,
        registry: Arc<SessionRegistry<M>>,
        handler: Arc<dyn SessionHandler<M>>,
    ) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(config.bind_address).await?;
        let bind_address = listener.local_addr()?;
        info!(%bind_address, protocol = %config.protocol, "Zard server bound");

        Ok(Arc::new(Self {
            config,
            handle: Handle::current(),
            listener: Arc::new(listener),
            bind_address,
            registry,
            handler,
            pending: Mutex::new(None),
            next_session: AtomicU64::new(1),
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            reaper: Mutex::new(None),
            started_at: Instant::now(),
        }))
    }

    /// Arm the first pending session and start the reaper.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Busy`] if the server is already running.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::Busy("server already running".to_string()));
        }
        info!(bind_address = %self.bind_address, "Starting Zard server");

        let reaper = SessionReaper::new(self.registry.clone(), self.config.reap_interval)
            .start(&self.handle, self.shutdown.child_token());
        *lock(&self.reaper) = Some(reaper);

        self.listen();
        Ok(())
    }

    /// Start the server and wait until it is shut down.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.start()?;
        self.shutdown.cancelled().await;
        Ok(())
    }

    /// Stop accepting, abort every session's pending read and stop the
    /// reaper.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) && self.shutdown.is_cancelled() {
            return;
        }
        info!(sessions = self.registry.len(), "Shutting down Zard server");
        self.shutdown.cancel();
        if let Some(reaper) = lock(&self.reaper).take() {
            reaper.abort();
        }
        lock(&self.pending).take();
    }

    /// Check if the server has been started.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The validated configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the server's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Registry of accepted sessions.
    pub fn registry(&self) -> &Arc<SessionRegistry<M>> {
        &self.registry
    }

    /// Token cancelled when the server shuts down
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Time since the server was bound
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Arm a fresh session on the listener.
    fn listen(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed));
        let connection = Connection::new(self.handle.clone())
            .with_protocol(self.config.protocol)
            .with_max_frame_length(self.config.max_frame_length)
            .with_serializer(Serializer::owned(&self.handle))
            .with_parent(&self.shutdown);
        let session = Session::new(id, TcpTransport::new(connection));
        session.set_handler(Arc::new(Dispatch {
            server: Arc::downgrade(self),
        }));

        *lock(&self.pending) = Some(session.clone());
        match session.accept(self.listener.clone()) {
            Ok(()) => trace!(session = %id, "Waiting for connection"),
            Err(error) => error!(session = %id, "Unable to arm listener: {}", error),
        }
    }

    fn accepted(self: &Arc<Self>, session: &Arc<Session<M>>) {
        self.clear_pending(session.id());
        self.registry.insert(session.clone());
        info!(
            session = %session.id(),
            peer_addr = ?session.peer_addr(),
            sessions = self.registry.len(),
            "Session connected"
        );

        if let Some(greeting) = &self.config.greeting {
            session.send(greeting.clone());
        }
        if let Err(error) = session.receive() {
            warn!(session = %session.id(), "Unable to start receiving: {}", error);
        }
        self.handler.on_accept(session);

        self.listen();
    }

    fn failed(self: &Arc<Self>, session: &Arc<Session<M>>, error: &ServiceError) {
        if !self.registry.contains(session.id()) {
            // The pending accept failed
            self.clear_pending(session.id());
            if self.shutdown.is_cancelled() {
                debug!("Listener stopped");
                return;
            }
            let server = Arc::downgrade(self);
            self.handle.spawn(async move {
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                if let Some(server) = server.upgrade() {
                    server.listen();
                }
            });
            return;
        }

        self.handler.on_error(session, error);

        // Disconnected sessions are closed and left for the next sweep
        if session.status() == SessionStatus::Disconnected {
            session.close();
            session.set_status(SessionStatus::Reapable);
        }
    }

    fn clear_pending(&self, id: SessionId) {
        let mut pending = lock(&self.pending);
        if pending.as_ref().is_some_and(|session| session.id() == id) {
            pending.take();
        }
    }
}

impl<M> Drop for SessionServer<M> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Routes session events through the server before the command layer.
struct Dispatch<M> {
    server: Weak<SessionServer<M>>,
}

impl<M> SessionHandler<M> for Dispatch<M>
where
    M: Clone + Default + Send + Sync + 'static,
{
    fn on_accept(&self, session: &Arc<Session<M>>) {
        if let Some(server) = self.server.upgrade() {
            server.accepted(session);
        }
    }

    fn on_message(&self, session: &Arc<Session<M>>, message: &Message) {
        if let Some(server) = self.server.upgrade() {
            server.handler.on_message(session, message);
        }
    }

    fn on_error(&self, session: &Arc<Session<M>>, error: &ServiceError) {
        if let Some(server) = self.server.upgrade() {
            server.failed(session, error);
        }
    }
}
