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

//! Frame encoding and decoding

use crate::{CodecError, CodecResult, Message, MessageType, Protocol};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Size of the big-endian length prefix in front of every `basic` frame.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Size of the type tag plus id header at the start of a `basic` frame.
pub const BASIC_HEADER_LEN: usize = 5;

/// Decode one raw frame into a [`Message`].
///
/// For delimited protocols `raw` is expected to still carry its terminator,
/// which is stripped exactly once. For `basic`, `raw` is the block following
/// the length prefix: `[tag][u32 id][contents]`.
///
/// # Errors
///
/// - [`CodecError::Truncated`] if a `basic` frame is shorter than 5 bytes.
/// - [`CodecError::UnknownMessageType`] if the `basic` tag is not `A` or `R`.
/// - [`CodecError::NotImplemented`] for `compressed`.
pub fn decode(protocol: Protocol, raw: &[u8]) -> CodecResult<Message> {
    decode_frame(protocol, Bytes::copy_from_slice(raw))
}

/// Zero-copy variant of [`decode`] for frames already split off a buffer.
pub fn decode_frame(protocol: Protocol, mut frame: Bytes) -> CodecResult<Message> {
    trace!(%protocol, bytes = frame.len(), "Decoding frame");
    match protocol {
        Protocol::Direct => Ok(Message::reply(0, frame)),
        Protocol::Line | Protocol::Telnet => {
            if let Some(delimiter) = protocol.delimiter() {
                if frame.ends_with(delimiter) {
                    frame.truncate(frame.len() - delimiter.len());
                }
            }
            Ok(Message::reply(0, frame))
        }
        Protocol::Basic => {
            if frame.len() < BASIC_HEADER_LEN {
                return Err(CodecError::Truncated { size: frame.len() });
            }
            let tag = frame.get_u8();
            let message_type =
                MessageType::from_tag(tag).ok_or(CodecError::UnknownMessageType(tag))?;
            let id = frame.get_u32();
            Ok(Message::new(message_type, id, frame))
        }
        Protocol::Compressed => Err(CodecError::NotImplemented(protocol)),
    }
}

/// Encode a message for the wire.
///
/// Delimited protocols append their terminator and carry no id or type.
/// `basic` produces `[u32 length][tag][u32 id][contents]` where the length
/// covers everything after the prefix. `direct` is the identity.
pub fn encode(
    protocol: Protocol,
    message_type: MessageType,
    id: u32,
    contents: &[u8],
) -> CodecResult<Bytes> {
    let mut dst = BytesMut::new();
    encode_into(protocol, message_type, id, contents, &mut dst)?;
    Ok(dst.freeze())
}

/// Encode a [`Message`] value for the wire, see [`encode`].
pub fn encode_message(protocol: Protocol, message: &Message) -> CodecResult<Bytes> {
    encode(
        protocol,
        message.message_type(),
        message.id(),
        message.contents(),
    )
}

/// Read a big-endian length prefix.
pub fn read_length_prefix(prefix: [u8; LENGTH_PREFIX_LEN]) -> u32 {
    u32::from_be_bytes(prefix)
}

/// Find the first occurrence of `delimiter` in `haystack`.
pub fn find_delimiter(haystack: &[u8], delimiter: &[u8]) -> Option<usize> {
    if delimiter.is_empty() || haystack.len() < delimiter.len() {
        return None;
    }
    haystack
        .windows(delimiter.len())
        .position(|window| window == delimiter)
}

fn encode_into(
    protocol: Protocol,
    message_type: MessageType,
    id: u32,
    contents: &[u8],
    dst: &mut BytesMut,
) -> CodecResult<()> {
    trace!(%protocol, %message_type, id, bytes = contents.len(), "Encoding message");
    match protocol {
        Protocol::Direct => {
            dst.extend_from_slice(contents);
        }
        Protocol::Line | Protocol::Telnet => {
            let delimiter = protocol.delimiter().unwrap_or_default();
            dst.reserve(contents.len() + delimiter.len());
            dst.extend_from_slice(contents);
            dst.extend_from_slice(delimiter);
        }
        Protocol::Basic => {
            let length = BASIC_HEADER_LEN + contents.len();
            let prefix = u32::try_from(length).map_err(|_| CodecError::FrameTooLarge {
                length,
                max: u32::MAX as usize,
            })?;
            dst.reserve(LENGTH_PREFIX_LEN + length);
            dst.put_u32(prefix);
            dst.put_u8(message_type.tag());
            dst.put_u32(id);
            dst.extend_from_slice(contents);
        }
        Protocol::Compressed => return Err(CodecError::NotImplemented(protocol)),
    }
    Ok(())
}

/// A `tokio_util` codec speaking one of the Zard protocols.
///
/// Useful for peers (clients, tests, tools) that want a `Framed` stream of
/// [`Message`] values rather than the callback driven transports of the
/// service crate. The protocol can be switched between frames.
///
/// `direct` has no defined frame boundary and `compressed` has no
/// implementation, so decoding either yields [`CodecError::NotImplemented`].
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    protocol: Protocol,
    max_frame_length: Option<usize>,
    // Index to resume the delimiter search from
    next_index: usize,
}

impl MessageCodec {
    /// Creates a codec for the given protocol
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            max_frame_length: None,
            next_index: 0,
        }
    }

    /// Reject frames longer than `max` bytes.
    pub fn with_max_frame_length(mut self, max: usize) -> Self {
        self.max_frame_length = Some(max);
        self
    }

    /// Protocol applied to the next frame.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Switch protocols between frames.
    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.protocol = protocol;
        self.next_index = 0;
    }

    fn check_length(&self, length: usize) -> CodecResult<()> {
        match self.max_frame_length {
            Some(max) if length > max => Err(CodecError::FrameTooLarge { length, max }),
            _ => Ok(()),
        }
    }

    fn decode_delimited(
        &mut self,
        delimiter: &'static [u8],
        src: &mut BytesMut,
    ) -> CodecResult<Option<Message>> {
        let start = self.next_index.min(src.len());
        if let Some(offset) = find_delimiter(&src[start..], delimiter) {
            let end = start + offset + delimiter.len();
            self.next_index = 0;
            self.check_length(end)?;
            let frame = src.split_to(end).freeze();
            return decode_frame(self.protocol, frame).map(Some);
        }
        self.check_length(src.len())?;
        // A partial delimiter may straddle the end of the buffer
        self.next_index = src.len().saturating_sub(delimiter.len() - 1);
        Ok(None)
    }

    fn decode_length_prefixed(&mut self, src: &mut BytesMut) -> CodecResult<Option<Message>> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }
        let length = read_length_prefix([src[0], src[1], src[2], src[3]]) as usize;
        self.check_length(length)?;
        let total = LENGTH_PREFIX_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(LENGTH_PREFIX_LEN);
        let frame = src.split_to(length).freeze();
        decode_frame(self.protocol, frame).map(Some)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, Self::Error> {
        match self.protocol {
            Protocol::Line => self.decode_delimited(b"\n", src),
            Protocol::Telnet => self.decode_delimited(b"\r\n", src),
            Protocol::Basic => self.decode_length_prefixed(src),
            protocol @ (Protocol::Direct | Protocol::Compressed) => {
                Err(CodecError::NotImplemented(protocol))
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(
            self.protocol,
            item.message_type(),
            item.id(),
            item.contents(),
            dst,
        )
    }
}

impl Encoder<&Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(
            self.protocol,
            item.message_type(),
            item.id(),
            item.contents(),
            dst,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line_strips_one_newline() {
        let message = decode(Protocol::Line, b"ping\n").unwrap();
        assert_eq!(message.message_type(), MessageType::Reply);
        assert_eq!(message.id(), 0);
        assert_eq!(message.contents().as_ref(), b"ping");

        let message = decode(Protocol::Line, b"ping\n\n").unwrap();
        assert_eq!(message.contents().as_ref(), b"ping\n");
    }

    #[test]
    fn test_decode_telnet_strips_crlf() {
        let message = decode(Protocol::Telnet, b"game list\r\n").unwrap();
        assert_eq!(message.contents().as_ref(), b"game list");
        assert_eq!(message.id(), 0);
    }

    #[test]
    fn test_decode_direct_is_identity() {
        let message = decode(Protocol::Direct, b"raw\r\n").unwrap();
        assert_eq!(message.contents().as_ref(), b"raw\r\n");
    }

    #[test]
    fn test_decode_basic() {
        let message = decode(Protocol::Basic, b"R\x00\x00\x01\x00OK").unwrap();
        assert_eq!(message.message_type(), MessageType::Reply);
        assert_eq!(message.id(), 256);
        assert_eq!(message.contents().as_ref(), b"OK");
    }

    #[test]
    fn test_decode_basic_header_only() {
        let message = decode(Protocol::Basic, b"A\xFF\xFF\xFF\xFF").unwrap();
        assert_eq!(message.id(), u32::MAX);
        assert!(message.contents().is_empty());
    }

    #[test]
    fn test_decode_basic_errors() {
        assert!(matches!(
            decode(Protocol::Basic, b"A\x00\x00"),
            Err(CodecError::Truncated { size: 3 })
        ));
        assert!(matches!(
            decode(Protocol::Basic, b"Q\x00\x00\x00\x01"),
            Err(CodecError::UnknownMessageType(b'Q'))
        ));
    }

    #[test]
    fn test_compressed_not_implemented() {
        assert!(matches!(
            decode(Protocol::Compressed, b"x"),
            Err(CodecError::NotImplemented(Protocol::Compressed))
        ));
        assert!(matches!(
            encode(Protocol::Compressed, MessageType::Action, 1, b"x"),
            Err(CodecError::NotImplemented(Protocol::Compressed))
        ));
    }

    #[test]
    fn test_encode_basic_layout() {
        let wire = encode(Protocol::Basic, MessageType::Action, 7, b"hello").unwrap();
        assert_eq!(
            wire.as_ref(),
            b"\x00\x00\x00\x0AA\x00\x00\x00\x07hello".as_slice()
        );
    }

    #[test]
    fn test_encode_delimited() {
        let line = encode(Protocol::Line, MessageType::Action, 9, b"OK").unwrap();
        assert_eq!(line.as_ref(), b"OK\n");
        let telnet = encode(Protocol::Telnet, MessageType::Reply, 9, b"OK").unwrap();
        assert_eq!(telnet.as_ref(), b"OK\r\n");
        let direct = encode(Protocol::Direct, MessageType::Reply, 9, b"OK").unwrap();
        assert_eq!(direct.as_ref(), b"OK");
    }

    #[test]
    fn test_find_delimiter() {
        assert_eq!(find_delimiter(b"abc\r\ndef", b"\r\n"), Some(3));
        assert_eq!(find_delimiter(b"abc\r", b"\r\n"), None);
        assert_eq!(find_delimiter(b"", b"\n"), None);
    }

    #[test]
    fn test_codec_decodes_split_crlf() {
        let mut codec = MessageCodec::new(Protocol::Telnet);
        let mut buffer = BytesMut::from(&b"hello\r"[..]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
        buffer.extend_from_slice(b"\nworld\r\n");
        let first = codec.decode(&mut buffer).unwrap().unwrap();
        let second = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(first.contents().as_ref(), b"hello");
        assert_eq!(second.contents().as_ref(), b"world");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_codec_basic_waits_for_full_frame() {
        let mut codec = MessageCodec::new(Protocol::Basic);
        let wire = encode(Protocol::Basic, MessageType::Reply, 3, b"abc").unwrap();
        let mut buffer = BytesMut::from(&wire[..6]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
        buffer.extend_from_slice(&wire[6..]);
        let message = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(message, Message::reply(3, "abc"));
    }

    #[test]
    fn test_codec_rejects_oversized_frame() {
        let mut codec = MessageCodec::new(Protocol::Basic).with_max_frame_length(16);
        let mut buffer = BytesMut::from(&b"\x00\x00\x01\x00"[..]);
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(CodecError::FrameTooLarge { length: 256, max: 16 })
        ));
    }

    #[test]
    fn test_codec_direct_not_implemented() {
        let mut codec = MessageCodec::new(Protocol::Direct);
        let mut buffer = BytesMut::from(&b"anything"[..]);
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(CodecError::NotImplemented(Protocol::Direct))
        ));
    }
}
