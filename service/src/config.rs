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

//! Server configuration

use crate::{DEFAULT_MAX_FRAME_LENGTH, Result, ServiceError};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;
use zard_codec::Protocol;

/// Default listening port
pub const DEFAULT_PORT: u16 = 2048;

/// Default interval between reaper sweeps
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);

/// Server configuration
///
/// Built once at startup and passed by value to the server. Use the builder
/// methods to customize it and [`validate`](ServerConfig::validate) to
/// resolve defaults before use.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use zard_service::ServerConfig;
///
/// let config = ServerConfig::default()
///     .with_port(4000)
///     .with_threads(4)
///     .with_reap_interval(Duration::from_secs(10))
///     .validate()
///     .unwrap();
/// assert_eq!(config.bind_address.port(), 4000);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_address: SocketAddr,

    /// Number of worker threads, 0 to use the hardware concurrency
    pub threads: usize,

    /// Delay between reaper sweeps
    pub reap_interval: Duration,

    /// Sent to every session once its peer is accepted
    pub greeting: Option<String>,

    /// Wire protocol for accepted sessions
    pub protocol: Protocol,

    /// Largest inbound frame, in bytes
    pub max_frame_length: usize,

    /// How long shutdown waits for in-flight work
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            threads: 0,
            reap_interval: DEFAULT_REAP_INTERVAL,
            greeting: None,
            protocol: Protocol::default(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the given bind address
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn with_bind_address(mut self, bind_address: SocketAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    /// Set the listening port, keeping the bind IP
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_address.set_port(port);
        self
    }

    /// Set the worker thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the reaper interval
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Set the greeting sent on accept
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    /// Set the session protocol
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the largest inbound frame
    pub fn with_max_frame_length(mut self, max: usize) -> Self {
        self.max_frame_length = max;
        self
    }

    /// Set the shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration, coercing recoverable values.
    ///
    /// A thread count of 0 becomes the hardware concurrency (or 1 if unknown)
    /// and a zero reap interval becomes one second, both with a warning.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InvalidConfig`] if the port is 0.
    pub fn validate(mut self) -> Result<Self> {
        if self.bind_address.port() == 0 {
            return Err(ServiceError::InvalidConfig(
                "port must be greater than 0".to_string(),
            ));
        }

        if self.threads == 0 {
            self.threads = match std::thread::available_parallelism() {
                Ok(threads) => threads.get(),
                Err(error) => {
                    warn!("Unable to detect the hardware concurrency, using 1 thread: {}", error);
                    1
                }
            };
        }

        if self.reap_interval.is_zero() {
            warn!("The reap interval must be at least one second, using 1 second");
            self.reap_interval = Duration::from_secs(1);
        }

        Ok(self)
    }
}
