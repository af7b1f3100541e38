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

//! Server error types

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use zard_service::ServiceError;

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that stop the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration file could not be read
    #[error("Failed to open configuration file {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is malformed
    #[error("Invalid configuration file {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Transport or session failure
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Runtime or I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Check if the configuration file could not be read. The server warns
    /// and continues with defaults in that case.
    pub fn is_unreadable_config(&self) -> bool {
        matches!(self, ServerError::ReadConfig { .. })
    }
}
