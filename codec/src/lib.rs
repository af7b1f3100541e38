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

//! # Zard Message Codec
//!
//! Encoding and decoding of Zard messages under the five wire protocols a
//! connection can speak.
//!
//! ## Protocols
//!
//! | protocol     | framing                                                        |
//! |--------------|----------------------------------------------------------------|
//! | `direct`     | none, the raw bytes are the contents                           |
//! | `line`       | contents terminated by `\n`                                     |
//! | `telnet`     | contents terminated by `\r\n`                                  |
//! | `basic`      | `[u32 length][tag 'A'/'R'][u32 id][contents]`, big-endian      |
//! | `compressed` | reserved, not implemented yet                                  |
//!
//! Delimited framing suits interactive clients. The `basic` framing is content
//! agnostic and carries an explicit message type and correlation id.
//!
//! ## Core Components
//!
//! - [`decode`] and [`encode`] convert between one raw frame and a [`Message`].
//! - [`MessageCodec`] implements the `tokio_util::codec` [`Decoder`] and
//!   [`Encoder`] traits so a peer can drive a `Framed` stream directly.
//!
//! ## Usage Example
//!
//! ```rust
//! use zard_codec::{decode, encode, MessageType, Protocol};
//!
//! let wire = encode(Protocol::Basic, MessageType::Action, 7, b"hello").unwrap();
//! assert_eq!(&wire[..4], &[0, 0, 0, 10]);
//!
//! let message = decode(Protocol::Basic, &wire[4..]).unwrap();
//! assert_eq!(message.id(), 7);
//! assert_eq!(message.contents().as_ref(), b"hello");
//! ```
//!
//! [`Decoder`]: tokio_util::codec::Decoder
//! [`Encoder`]: tokio_util::codec::Encoder

mod codec;
mod message;
mod protocol;
mod result;

pub use codec::{
    BASIC_HEADER_LEN, LENGTH_PREFIX_LEN, MessageCodec, decode, decode_frame, encode,
    encode_message, find_delimiter, read_length_prefix,
};
pub use message::{Message, MessageType};
pub use protocol::{ParseProtocolError, Protocol};
pub use result::{CodecError, CodecResult};
