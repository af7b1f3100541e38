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

//! Benchmarks for message framing performance

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};
use zard_codec::{LENGTH_PREFIX_LEN, Message, MessageCodec, MessageType, Protocol, decode, encode};

const SIZES: [usize; 4] = [10, 100, 1000, 10000];

// ============================================================================
// Encoding Benchmarks
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for protocol in [Protocol::Line, Protocol::Telnet, Protocol::Basic] {
        for size in SIZES.iter() {
            let payload = vec![b'A'; *size];
            group.throughput(Throughput::Bytes(*size as u64));
            group.bench_with_input(
                BenchmarkId::new(protocol.name(), size),
                &payload,
                |b, payload| {
                    b.iter(|| {
                        encode(
                            black_box(protocol),
                            MessageType::Action,
                            black_box(42),
                            black_box(payload),
                        )
                        .unwrap()
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_codec_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_encode");

    for size in SIZES.iter() {
        let message = Message::reply(7, vec![b'Z'; *size]);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            let mut codec = MessageCodec::new(Protocol::Basic);
            let mut buffer = BytesMut::with_capacity(size + 16);
            b.iter(|| {
                buffer.clear();
                codec.encode(black_box(message), &mut buffer).unwrap();
            });
        });
    }

    group.finish();
}

// ============================================================================
// Decoding Benchmarks
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for protocol in [Protocol::Line, Protocol::Telnet, Protocol::Basic] {
        for size in SIZES.iter() {
            let wire = encode(protocol, MessageType::Reply, 9, &vec![b'A'; *size]).unwrap();
            let raw = if protocol.is_length_prefixed() {
                wire.slice(LENGTH_PREFIX_LEN..)
            } else {
                wire
            };
            group.throughput(Throughput::Bytes(*size as u64));
            group.bench_with_input(BenchmarkId::new(protocol.name(), size), &raw, |b, raw| {
                b.iter(|| decode(black_box(protocol), black_box(raw)).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_codec_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_stream");

    // A burst of short lobby commands, as a busy client would send
    let commands = ["help", "user alice", "game list", "game create arena"];
    for protocol in [Protocol::Telnet, Protocol::Basic] {
        let mut stream = BytesMut::new();
        let mut encoder = MessageCodec::new(protocol);
        for (id, command) in commands.iter().cycle().take(100).enumerate() {
            encoder
                .encode(Message::action(id as u32 + 1, *command), &mut stream)
                .unwrap();
        }
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(protocol.name()),
            &stream,
            |b, stream| {
                b.iter(|| {
                    let mut codec = MessageCodec::new(protocol);
                    let mut buffer = stream.clone();
                    let mut count = 0usize;
                    while let Some(message) = codec.decode(&mut buffer).unwrap() {
                        black_box(&message);
                        count += 1;
                    }
                    count
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_codec_encode,
    bench_decode,
    bench_codec_stream
);
criterion_main!(benches);
