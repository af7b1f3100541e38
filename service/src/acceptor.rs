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

//! One-shot asynchronous accept

use crate::{AcceptHandler, Completion, Connection, Result, ServiceError, read_lock, write_lock};
use metrics::counter;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Hands an established stream to the receiver and sender of a transport.
pub type StreamInstaller = Arc<dyn Fn(TcpStream) + Send + Sync + 'static>;

/// Accept capability of a transport.
///
/// Each call to [`accept`](Acceptor::accept) waits for exactly one peer;
/// listening for the next one is up to the caller.
#[derive(Clone)]
pub struct Acceptor {
    inner: Arc<AcceptorInner>,
}

struct AcceptorInner {
    connection: Arc<Connection>,
    install: StreamInstaller,
    handler: RwLock<Option<AcceptHandler>>,
}

impl Acceptor {
    /// Create an acceptor that passes accepted streams to `install`.
    pub fn new(connection: Arc<Connection>, install: StreamInstaller) -> Self {
        Self {
            inner: Arc::new(AcceptorInner {
                connection,
                install,
                handler: RwLock::new(None),
            }),
        }
    }

    /// Register the accept handler, replacing any previous one.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(std::result::Result<(), &ServiceError>) + Send + Sync + 'static,
    {
        *write_lock(&self.inner.handler) = Some(Arc::new(handler));
    }

    /// Wait for one peer on `listener`.
    ///
    /// Closing the connection while waiting completes the accept with
    /// [`ServiceError::ConnectionClosed`].
    pub fn accept(&self, listener: Arc<TcpListener>) {
        let connection = self.inner.connection.clone();
        let cancel = connection.cancel_token().clone();
        let spawner = connection.clone();
        let inner = self.inner.clone();
        connection.serializer().execute_with(
            move |done: Completion<Result<(TcpStream, SocketAddr)>>| {
                spawner.spawn(async move {
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(ServiceError::ConnectionClosed),
                        result = listener.accept() => result.map_err(ServiceError::from),
                    };
                    done(result);
                });
            },
            move |result| inner.accepted(result),
        );
    }

    /// The connection accepted streams are installed on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.connection
    }
}

impl AcceptorInner {
    fn accepted(&self, result: Result<(TcpStream, SocketAddr)>) {
        let id = self.connection.id();
        let outcome = match result {
            Ok((stream, peer)) => {
                if let Err(error) = stream.set_nodelay(true) {
                    debug!(connection = %id, "Failed to set TCP_NODELAY: {}", error);
                }
                self.connection.set_peer_addr(Some(peer));
                (self.install)(stream);
                counter!("zard.connections.accepted").increment(1);
                info!(connection = %id, peer_addr = %peer, "Accepted connection");
                Ok(())
            }
            Err(error) => {
                counter!("zard.errors.accept").increment(1);
                if matches!(error, ServiceError::ConnectionClosed) {
                    debug!(connection = %id, "Accept cancelled");
                } else {
                    error!(connection = %id, "Accept failed: {}", error);
                }
                Err(error)
            }
        };
        let handler = read_lock(&self.handler).clone();
        if let Some(handler) = handler {
            handler(outcome.as_ref().map(|_| ()));
        }
    }
}
