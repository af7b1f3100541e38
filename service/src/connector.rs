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

//! Resolve-then-connect with address list retry
//!
//! ```text
//! connect(host, service)
//!     resolve ── error ──────────────────────────> handler(Err(Resolve))
//!        │
//!        └─ [a0, a1, .., an] ── empty ───────────> handler(Err(NoAddresses))
//!               │
//!               a0 ── refused ─> a1 ── ... ─> an ── refused ─> handler(Err(last))
//!               └── ok ─────────────────────────> handler(Ok)
//! ```
//!
//! Every completion re-enters the connection's serializer before the next
//! step runs. The connect handler fires exactly once per `connect()`.

use crate::{
    Completion, ConnectHandler, Connection, Resolver, Result, ServiceError, StreamInstaller,
    read_lock, write_lock,
};
use metrics::counter;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Outbound connect capability of a transport.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    connection: Arc<Connection>,
    install: StreamInstaller,
    resolver: Arc<dyn Resolver>,
    handler: RwLock<Option<ConnectHandler>>,
    in_progress: AtomicBool,
}

/// The candidates of one `connect()` call.
struct Attempt {
    host: String,
    service: String,
    addresses: Vec<SocketAddr>,
}

impl Connector {
    /// Create a connector that passes established streams to `install`.
    pub fn new(
        connection: Arc<Connection>,
        install: StreamInstaller,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                connection,
                install,
                resolver,
                handler: RwLock::new(None),
                in_progress: AtomicBool::new(false),
            }),
        }
    }

    /// Register the connect handler, replacing any previous one.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(std::result::Result<(), &ServiceError>) + Send + Sync + 'static,
    {
        *write_lock(&self.inner.handler) = Some(Arc::new(handler));
    }

    /// Resolve `host`/`service` and connect to the first candidate that
    /// accepts.
    ///
    /// A second call while one is outstanding is rejected with
    /// [`ServiceError::Busy`], delivered to the connect handler.
    pub fn connect(&self, host: impl Into<String>, service: impl Into<String>) {
        let host = host.into();
        let service = service.into();
        let inner = self.inner.clone();

        if self.inner.in_progress.swap(true, Ordering::AcqRel) {
            let error = ServiceError::Busy(format!(
                "a connect is already in progress on {}",
                self.inner.connection.id()
            ));
            self.inner
                .connection
                .execute(move || inner.notify(Err(&error)));
            return;
        }

        debug!(connection = %self.inner.connection.id(), %host, %service, "Resolving");
        let connection = self.inner.connection.clone();
        let cancel = connection.cancel_token().clone();
        let resolver = self.inner.resolver.clone();
        let spawner = connection.clone();
        connection.serializer().execute_with(
            move |done: Completion<(String, String, Result<Vec<SocketAddr>>)>| {
                spawner.spawn(async move {
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(ServiceError::ConnectionClosed),
                        result = resolver.resolve(&host, &service) => {
                            result.map_err(|source| ServiceError::Resolve {
                                host: host.clone(),
                                service: service.clone(),
                                source,
                            })
                        }
                    };
                    done((host, service, result));
                });
            },
            move |(host, service, result): (String, String, Result<Vec<SocketAddr>>)| {
                inner.resolved(host, service, result)
            },
        );
    }

    /// Check if a `connect()` is outstanding.
    pub fn is_connecting(&self) -> bool {
        self.inner.in_progress.load(Ordering::Acquire)
    }

    /// The connection connected streams are installed on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.connection
    }
}

impl ConnectorInner {
    fn resolved(
        self: Arc<Self>,
        host: String,
        service: String,
        result: Result<Vec<SocketAddr>>,
    ) {
        match result {
            Ok(addresses) if addresses.is_empty() => {
                self.finish(Err(ServiceError::NoAddresses { host, service }))
            }
            Ok(addresses) => {
                debug!(
                    connection = %self.connection.id(),
                    %host,
                    %service,
                    candidates = addresses.len(),
                    "Resolved"
                );
                self.try_connect(
                    Attempt {
                        host,
                        service,
                        addresses,
                    },
                    0,
                );
            }
            Err(error) => self.finish(Err(error)),
        }
    }

    fn try_connect(self: Arc<Self>, attempt: Attempt, index: usize) {
        let address = attempt.addresses[index];
        let cancel = self.connection.cancel_token().clone();
        let inner = self.clone();
        let complete = self.connection.serializer().wrap(
            move |(attempt, result): (Attempt, io::Result<TcpStream>)| {
                inner.connected(attempt, index, result)
            },
        );
        self.connection.spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(io::Error::new(io::ErrorKind::Interrupted, "connect cancelled")),
                result = TcpStream::connect(address) => result,
            };
            complete((attempt, result));
        });
    }

    fn connected(self: Arc<Self>, attempt: Attempt, index: usize, result: io::Result<TcpStream>) {
        let address = attempt.addresses[index];
        match result {
            Ok(stream) => {
                if let Err(error) = stream.set_nodelay(true) {
                    debug!(connection = %self.connection.id(), "Failed to set TCP_NODELAY: {}", error);
                }
                self.connection.set_peer_addr(Some(address));
                (self.install)(stream);
                info!(
                    connection = %self.connection.id(),
                    host = %attempt.host,
                    peer_addr = %address,
                    "Connected"
                );
                self.finish(Ok(()));
            }
            Err(_) if self.connection.is_closed() => self.finish(Err(ServiceError::ConnectionClosed)),
            Err(error) if index + 1 < attempt.addresses.len() => {
                warn!(
                    connection = %self.connection.id(),
                    peer_addr = %address,
                    "Connect failed, trying next address: {}",
                    error
                );
                self.try_connect(attempt, index + 1);
            }
            Err(error) => self.finish(Err(error.into())),
        }
    }

    fn finish(&self, result: Result<()>) {
        self.in_progress.store(false, Ordering::Release);
        match &result {
            Ok(()) => counter!("zard.connections.connected").increment(1),
            Err(error) => {
                counter!("zard.errors.connect").increment(1);
                error!(connection = %self.connection.id(), "Connect failed: {}", error);
            }
        }
        self.notify(result.as_ref().map(|_| ()));
    }

    fn notify(&self, result: std::result::Result<(), &ServiceError>) {
        let handler = read_lock(&self.handler).clone();
        if let Some(handler) = handler {
            handler(result);
        }
    }
}
