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

//! Error types for the transport and session layer

use std::io;
use thiserror::Error;
use zard_codec::CodecError;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Service error types
///
/// Errors are delivered to the handler registered for the failing operation
/// (receive, send, accept or connect) together with the byte count of
/// whatever partial data exists.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed frame or unsupported encoding from the codec layer
    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    /// I/O error from the underlying socket or stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The connection was closed locally while the operation was pending
    #[error("Connection closed")]
    ConnectionClosed,

    /// No stream has been accepted or connected yet
    #[error("Not connected")]
    NotConnected,

    /// Resolving a host/service pair failed
    #[error("Failed to resolve {host}:{service}: {source}")]
    Resolve {
        /// Host name being resolved
        host: String,
        /// Service name or port being resolved
        service: String,
        /// Underlying lookup failure
        #[source]
        source: io::Error,
    },

    /// Resolving succeeded but produced no candidate addresses
    #[error("No addresses found for {host}:{service}")]
    NoAddresses {
        /// Host name being resolved
        host: String,
        /// Service name or port being resolved
        service: String,
    },

    /// An equivalent operation is already outstanding, or an identity is taken
    #[error("Busy: {0}")]
    Busy(String),

    /// The requested behavior has no implementation
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// A configuration value was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServiceError {
    /// Check if the error is a framing error caused by malformed peer input
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, ServiceError::Protocol(error) if error.is_framing_error())
    }

    /// Check if the error is an OS level or connection establishment failure
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Io(_)
                | ServiceError::ConnectionClosed
                | ServiceError::NotConnected
                | ServiceError::Resolve { .. }
                | ServiceError::NoAddresses { .. }
        )
    }

    /// Check if the error reports an outstanding operation or a taken identity
    pub fn is_busy(&self) -> bool {
        matches!(self, ServiceError::Busy(_))
    }

    /// Check if the error reports missing functionality
    pub fn is_not_implemented(&self) -> bool {
        matches!(
            self,
            ServiceError::NotImplemented(_) | ServiceError::Protocol(CodecError::NotImplemented(_))
        )
    }

    /// Check if the peer closed the stream
    pub fn is_eof(&self) -> bool {
        matches!(self, ServiceError::Io(error) if error.kind() == io::ErrorKind::UnexpectedEof)
    }

    /// The end-of-stream error reported when a peer closes mid-read.
    pub(crate) fn eof() -> Self {
        ServiceError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        ))
    }
}
