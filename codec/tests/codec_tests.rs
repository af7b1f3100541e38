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

//! Property and stream tests for the message codecs

use futures::{SinkExt, StreamExt};
use proptest::prelude::*;
use zard_codec::{
    CodecError, LENGTH_PREFIX_LEN, Message, MessageCodec, MessageType, Protocol, decode, encode,
};
use tokio_util::codec::{FramedRead, FramedWrite};

// ============================================================================
// Strategies
// ============================================================================

fn message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![Just(MessageType::Action), Just(MessageType::Reply)]
}

/// Contents that never contain a line terminator.
fn line_contents() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>().prop_filter("no newline", |b| *b != b'\n'), 0..256)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn basic_round_trips_any_id_and_payload(
        kind in message_type(),
        id in any::<u32>(),
        payload in proptest::collection::vec(any::<u8>(), 0..1024),
    ) {
        let wire = encode(Protocol::Basic, kind, id, &payload).unwrap();
        let length = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize;
        prop_assert_eq!(length, 5 + payload.len());
        prop_assert_eq!(wire.len(), LENGTH_PREFIX_LEN + length);

        let message = decode(Protocol::Basic, &wire[LENGTH_PREFIX_LEN..]).unwrap();
        prop_assert_eq!(message, Message::new(kind, id, payload));
    }

    #[test]
    fn line_round_trips_as_uncorrelated_reply(contents in line_contents(), id in any::<u32>()) {
        let wire = encode(Protocol::Line, MessageType::Action, id, &contents).unwrap();
        let message = decode(Protocol::Line, &wire).unwrap();
        prop_assert_eq!(message, Message::reply(0, contents));
    }

    #[test]
    fn telnet_round_trips_as_uncorrelated_reply(contents in line_contents()) {
        let wire = encode(Protocol::Telnet, MessageType::Reply, 0, &contents).unwrap();
        let message = decode(Protocol::Telnet, &wire).unwrap();
        prop_assert_eq!(message, Message::reply(0, contents));
    }

    #[test]
    fn truncated_basic_always_fails(raw in proptest::collection::vec(any::<u8>(), 0..5)) {
        let is_truncated = matches!(
            decode(Protocol::Basic, &raw),
            Err(CodecError::Truncated { .. })
        );
        prop_assert!(is_truncated);
    }

    #[test]
    fn unknown_tag_always_fails(
        tag in any::<u8>().prop_filter("not a known tag", |t| *t != b'A' && *t != b'R'),
        rest in proptest::collection::vec(any::<u8>(), 4..64),
    ) {
        let mut raw = vec![tag];
        raw.extend_from_slice(&rest);
        let is_unknown = matches!(
            decode(Protocol::Basic, &raw),
            Err(CodecError::UnknownMessageType(t)) if t == tag
        );
        prop_assert!(is_unknown);
    }
}

// ============================================================================
// Framed stream tests
// ============================================================================

#[tokio::test]
async fn framed_basic_stream_preserves_order_and_ids() {
    let (client, server) = tokio::io::duplex(64);
    let mut writer = FramedWrite::new(client, MessageCodec::new(Protocol::Basic));
    let mut reader = FramedRead::new(server, MessageCodec::new(Protocol::Basic));

    let sent = vec![
        Message::action(1, "user alice"),
        Message::reply(1, "OK\n"),
        Message::action(2, vec![0u8; 300]),
    ];

    let outgoing = sent.clone();
    let write_task = tokio::spawn(async move {
        for message in outgoing {
            writer.send(message).await.unwrap();
        }
    });

    for expected in &sent {
        let received = reader.next().await.unwrap().unwrap();
        assert_eq!(&received, expected);
    }
    write_task.await.unwrap();
}

#[tokio::test]
async fn framed_line_stream_splits_on_newline() {
    let input: &[u8] = b"user bob\ngame list\n\ntrailing";
    let mut reader = FramedRead::new(input, MessageCodec::new(Protocol::Line));

    let mut contents = Vec::new();
    while let Some(Ok(message)) = reader.next().await {
        contents.push(message.contents_lossy().into_owned());
    }

    // The unterminated tail is not a frame
    assert_eq!(contents, vec!["user bob", "game list", ""]);
}
