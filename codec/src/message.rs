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

//! Decoded message values

use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;

/// The kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// A request carrying a freshly allocated, non-zero correlation id.
    Action,
    /// A response carrying the id of the action it answers. Delimited
    /// protocols have no tag and always decode as replies with id 0.
    Reply,
}

impl MessageType {
    /// The tag byte used by the `basic` framing.
    pub fn tag(self) -> u8 {
        match self {
            MessageType::Action => b'A',
            MessageType::Reply => b'R',
        }
    }

    /// Look up a message type by its `basic` tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'A' => Some(MessageType::Action),
            b'R' => Some(MessageType::Reply),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Action => write!(f, "action"),
            MessageType::Reply => write!(f, "reply"),
        }
    }
}

/// A single application message.
///
/// Messages are immutable once built; every encode or decode produces a
/// fresh value. An id of `0` means "no correlation".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    message_type: MessageType,
    id: u32,
    contents: Bytes,
}

impl Message {
    /// Create a message from its parts.
    pub fn new(message_type: MessageType, id: u32, contents: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            id,
            contents: contents.into(),
        }
    }

    /// Create an action message.
    pub fn action(id: u32, contents: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Action, id, contents)
    }

    /// Create a reply message.
    pub fn reply(id: u32, contents: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Reply, id, contents)
    }

    /// Action or reply.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Payload, without framing.
    pub fn contents(&self) -> &Bytes {
        &self.contents
    }

    /// The contents as text, replacing invalid UTF-8 sequences.
    pub fn contents_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.contents)
    }

    /// Consume the message and return its contents.
    pub fn into_contents(self) -> Bytes {
        self.contents
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} ({} bytes)",
            self.message_type,
            self.id,
            self.contents.len()
        )
    }
}
