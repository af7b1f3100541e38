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

//! Wire protocol selection

use std::fmt;
use std::str::FromStr;

/// The wire protocol spoken on a connection.
///
/// The protocol decides how a byte stream is cut into frames and how a frame
/// maps onto a [`Message`](crate::Message). It is stored per connection and
/// may be changed while the connection is live; the new value applies to the
/// next frame read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Protocol {
    /// No formatting, the raw bytes are the message.
    Direct = 0,
    /// Lines terminated by a single `\n`.
    Line = 1,
    /// Lines terminated by `\r\n`.
    #[default]
    Telnet = 2,
    /// Length prefixed binary frames carrying a type tag and an id.
    Basic = 3,
    /// Length prefixed and compressed. Reserved.
    Compressed = 4,
}

impl Protocol {
    /// All protocols, in declaration order.
    pub const ALL: [Protocol; 5] = [
        Protocol::Direct,
        Protocol::Line,
        Protocol::Telnet,
        Protocol::Basic,
        Protocol::Compressed,
    ];

    /// Convert from u8 (for atomic storage)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Direct,
            1 => Self::Line,
            2 => Self::Telnet,
            3 => Self::Basic,
            4 => Self::Compressed,
            _ => Self::default(),
        }
    }

    /// Convert to u8 (for atomic storage)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The frame terminator for delimiter based protocols.
    pub fn delimiter(self) -> Option<&'static [u8]> {
        match self {
            Self::Line => Some(b"\n"),
            Self::Telnet => Some(b"\r\n"),
            _ => None,
        }
    }

    /// Whether frames of this protocol start with a 4 byte length prefix.
    pub fn is_length_prefixed(self) -> bool {
        matches!(self, Self::Basic | Self::Compressed)
    }

    /// The protocol name as used in configuration and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Line => "line",
            Self::Telnet => "telnet",
            Self::Basic => "basic",
            Self::Compressed => "compressed",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a protocol name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown protocol `{0}`")]
pub struct ParseProtocolError(pub String);

impl FromStr for Protocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|protocol| protocol.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseProtocolError(s.to_string()))
    }
}
