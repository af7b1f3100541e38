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

//! Zard Transport and Session Layer
//!
//! This crate provides the asynchronous transport and session machinery of the
//! Zard lobby server:
//!
//! - Per-connection serializers so handlers for one connection never overlap
//! - Continuous framed receive loops and FIFO send queues
//! - Callback style accept and resolve-then-connect operations
//! - Sessions with a forward-only lifecycle, a registry and a reaper
//!
//! # Architecture
//!
//! ```text
//! SessionServer ── SessionRegistry ── SessionReaper
//!     ↓
//! Session<M>
//!     ↓
//! Transport (TcpTransport / StreamTransport)
//!     ├── Acceptor / Connector
//!     ├── Receiver
//!     └── Sender
//!     ↓
//! Connection ── Serializer ── Strand
//! ```
//!
//! Every asynchronous completion is posted back through its connection's
//! [`Serializer`] before a handler runs. All connections share the tokio
//! runtime's worker pool.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zard_codec::Message;
//! use zard_service::{ServerConfig, Session, SessionHandler, SessionServer};
//!
//! struct Echo;
//!
//! impl SessionHandler<()> for Echo {
//!     fn on_message(&self, session: &Arc<Session<()>>, message: &Message) {
//!         session.send_reply(message.id(), message.contents().clone());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default().with_greeting("Zard\n1").validate()?;
//!     let server = SessionServer::bind(config, Arc::new(Echo)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

mod acceptor;
mod config;
mod connection;
mod connector;
mod error;
mod handler;
mod reaper;
mod receiver;
mod registry;
mod resolver;
mod sender;
mod serializer;
mod server;
mod session;
mod transport;
mod types;

pub use acceptor::{Acceptor, StreamInstaller};
pub use config::{DEFAULT_PORT, DEFAULT_REAP_INTERVAL, ServerConfig};
pub use connection::{Connection, DEFAULT_MAX_FRAME_LENGTH};
pub use connector::Connector;
pub use error::{Result, ServiceError};
pub use handler::{AcceptHandler, ConnectHandler, ReceiveHandler, SendHandler, SessionHandler};
pub use reaper::SessionReaper;
pub use receiver::{Reader, Receiver};
pub use registry::SessionRegistry;
pub use resolver::{DnsResolver, Resolver, StaticResolver, service_port};
pub use sender::{Sender, Writer};
pub use serializer::{Completion, Serializer, Strand, Task};
pub use server::SessionServer;
pub use session::Session;
pub use transport::{StreamTransport, TcpTransport, Transport};
pub use types::{ConnectionId, SessionId, SessionStatus};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// A panicking handler must not wedge the connection it ran on.

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
