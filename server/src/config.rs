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

//! Configuration file
//!
//! The server reads an optional TOML file:
//!
//! ```toml
//! threads = 4
//! port = 2048
//! reap_interval = 30
//! log_level = "info"
//! ```
//!
//! Every key is optional.

use crate::{Result, ServerError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zard_codec::Protocol;
use zard_service::{DEFAULT_PORT, DEFAULT_REAP_INTERVAL, ServerConfig};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/zardrc.toml";

/// Greeting sent to every accepted session
pub const GREETING: &str = "Zard\n1";

/// Maximum log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Contents of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Worker threads, 0 to use the hardware concurrency
    pub threads: usize,

    /// Listening port
    pub port: u16,

    /// Seconds between reaper sweeps
    pub reap_interval: u64,

    /// Maximum log level
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threads: 0,
            port: DEFAULT_PORT,
            reap_interval: DEFAULT_REAP_INTERVAL.as_secs(),
            log_level: LogLevel::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`.
    ///
    /// # Errors
    ///
    /// [`ServerError::ReadConfig`] if the file cannot be read and
    /// [`ServerError::ParseConfig`] if it is not valid.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ReadConfig {
            path: PathBuf::from(path),
            source,
        })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|source| ServerError::ParseConfig {
            path: PathBuf::from(path),
            source,
        })
    }

    /// Apply command line overrides
    pub fn with_overrides(mut self, port: Option<u16>, threads: Option<usize>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(threads) = threads {
            self.threads = threads;
        }
        self
    }

    /// Build the unvalidated server configuration.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::default()
            .with_port(self.port)
            .with_threads(self.threads)
            .with_reap_interval(Duration::from_secs(self.reap_interval))
            .with_protocol(Protocol::Telnet)
            .with_greeting(GREETING)
    }
}
