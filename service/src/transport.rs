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

//! Transports composed from their capabilities
//!
//! ```text
//! TcpTransport
//!     ├── Connection (protocol, serializer, cancellation)
//!     ├── Receiver   ┐
//!     ├── Sender     ┴── fed by the installer on accept/connect
//!     ├── Acceptor
//!     └── Connector ── Resolver
//!
//! StreamTransport
//!     ├── Connection
//!     ├── Receiver ── any AsyncRead
//!     └── Sender   ── any AsyncWrite
//! ```

use crate::{
    Acceptor, Connection, Connector, DnsResolver, Receiver, Resolver, Sender, StreamInstaller,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use zard_codec::Protocol;

/// A bidirectional message transport.
pub trait Transport: Send + Sync + 'static {
    /// Shared state of this transport
    fn connection(&self) -> &Arc<Connection>;

    /// Inbound read loop
    fn receiver(&self) -> &Receiver;

    /// Outbound queue
    fn sender(&self) -> &Sender;

    /// Accept capability, for transports that can accept peers
    fn acceptor(&self) -> Option<&Acceptor> {
        None
    }

    /// Connect capability, for transports that can dial out
    fn connector(&self) -> Option<&Connector> {
        None
    }

    /// Abort the pending read and shut down the write direction after the
    /// write in flight.
    fn close(&self) {
        self.connection().close();
        self.sender().close();
    }

    fn protocol(&self) -> Protocol {
        self.connection().protocol()
    }

    fn set_protocol(&self, protocol: Protocol) {
        self.connection().set_protocol(protocol);
    }
}

/// TCP transport with accept and connect capabilities.
pub struct TcpTransport {
    connection: Arc<Connection>,
    receiver: Receiver,
    sender: Sender,
    acceptor: Acceptor,
    connector: Connector,
}

impl TcpTransport {
    /// Create a transport resolving hosts through the system resolver.
    pub fn new(connection: Connection) -> Self {
        Self::with_resolver(connection, Arc::new(DnsResolver))
    }

    /// Create a transport resolving hosts through `resolver`.
    pub fn with_resolver(connection: Connection, resolver: Arc<dyn Resolver>) -> Self {
        let connection = Arc::new(connection);
        let receiver = Receiver::new(connection.clone());
        let sender = Sender::new(connection.clone());

        let install: StreamInstaller = {
            let receiver = receiver.clone();
            let sender = sender.clone();
            Arc::new(move |stream: TcpStream| {
                let (read_half, write_half) = stream.into_split();
                receiver.attach(read_half);
                sender.attach(write_half);
            })
        };

        Self {
            acceptor: Acceptor::new(connection.clone(), install.clone()),
            connector: Connector::new(connection.clone(), install, resolver),
            connection,
            receiver,
            sender,
        }
    }

    /// Wait for one peer on `listener`, see [`Acceptor::accept`].
    pub fn accept(&self, listener: Arc<TcpListener>) {
        self.acceptor.accept(listener);
    }

    /// Connect to `host`/`service`, see [`Connector::connect`].
    pub fn connect(&self, host: impl Into<String>, service: impl Into<String>) {
        self.connector.connect(host, service);
    }
}

impl Transport for TcpTransport {
    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    fn sender(&self) -> &Sender {
        &self.sender
    }

    fn acceptor(&self) -> Option<&Acceptor> {
        Some(&self.acceptor)
    }

    fn connector(&self) -> Option<&Connector> {
        Some(&self.connector)
    }
}

/// Transport over an arbitrary pair of byte streams, such as standard input
/// and output or an in-memory duplex pipe.
pub struct StreamTransport {
    connection: Arc<Connection>,
    receiver: Receiver,
    sender: Sender,
}

impl StreamTransport {
    /// Create a transport over an already connected reader and writer.
    pub fn new(
        connection: Connection,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        let connection = Arc::new(connection);
        let receiver = Receiver::new(connection.clone());
        let sender = Sender::new(connection.clone());
        receiver.attach(reader);
        sender.attach(writer);
        Self {
            connection,
            receiver,
            sender,
        }
    }
}

impl Transport for StreamTransport {
    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    fn sender(&self) -> &Sender {
        &self.sender
    }
}
