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

//! Error types for codec operations

use crate::Protocol;

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Represents possible errors that can occur while framing messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A `basic` frame was shorter than its type tag and id header.
    #[error("a basic message of {size} bytes is too small for its 5 byte header")]
    Truncated {
        /// Size of the offending frame in bytes
        size: usize,
    },

    /// A `basic` frame carried a type tag other than `A` or `R`.
    #[error("unexpected message type tag 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol has no implementation yet.
    #[error("protocol `{0}` is not implemented yet")]
    NotImplemented(Protocol),

    /// A frame exceeded the configured maximum length.
    #[error("frame of {length} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge {
        /// Announced or accumulated frame length
        length: usize,
        /// Configured limit
        max: usize,
    },

    /// An I/O error occurred while reading from or writing to the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Whether the error is caused by malformed peer input.
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            CodecError::Truncated { .. }
                | CodecError::UnknownMessageType(_)
                | CodecError::FrameTooLarge { .. }
        )
    }
}
